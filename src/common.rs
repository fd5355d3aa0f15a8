// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use serde::{Deserialize, Serialize};

/// Node values set by callers (constant values, level start values) must
/// fall inside this closed range; a violation is a fatal `ValueOutOfRange`.
/// Values computed during simulation are not range checked.
pub const VALUE_MIN: f64 = -1e9;
pub const VALUE_MAX: f64 = 1e9;

/// Opaque, stable handle identifying a node within its owning [`Model`].
///
/// Handles are allocated in creation order and never reused, so they double
/// as a deterministic tie-break wherever the engine needs one (validation
/// reporting, auxiliary scheduling).
///
/// [`Model`]: crate::Model
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    NotChangeable,
    StillChangeable,
    ValueOutOfRange,
    WrongNodeType,
    NotNamed,
    NoValue,
    InconsistentFlow,
    BadFormulaRef,
    NoFormula,
    FormulaDependency,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            NotChangeable => "not_changeable",
            StillChangeable => "still_changeable",
            ValueOutOfRange => "value_out_of_range",
            WrongNodeType => "wrong_node_type",
            NotNamed => "not_named",
            NoValue => "no_value",
            InconsistentFlow => "inconsistent_flow",
            BadFormulaRef => "bad_formula_ref",
            NoFormula => "no_formula",
            FormulaDependency => "formula_dependency",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Model,
    Simulation,
    Node,
}

/// A contract violation: caller misuse of the engine, as opposed to a
/// recoverable domain problem (those are [`ValidationError`]s).
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    /// The entity the error is about, when there is a single one.
    pub node: Option<NodeId>,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            node: None,
            details,
        }
    }

    pub fn for_node(kind: ErrorKind, code: ErrorCode, node: NodeId) -> Self {
        Error {
            kind,
            code,
            node: Some(node),
            details: None,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Model => "ModelError",
            ErrorKind::Simulation => "SimulationError",
            ErrorKind::Node => "NodeError",
        };
        match (self.node, self.details.as_ref()) {
            (Some(node), Some(details)) => write!(f, "{}{{{}: {} {}}}", kind, self.code, node, details),
            (Some(node), None) => write!(f, "{}{{{}: {}}}", kind, self.code, node),
            (None, Some(details)) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            (None, None) => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// A domain validation failure: recoverable and expected.  The model is
/// left changeable and untouched, so the caller can fix its inputs and
/// re-validate.  Rules are checked in a fixed order and the first failure
/// wins; each variant carries the offending entity where one exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationError {
    /// Rule 1: the model has no level node.
    NoLevelNode,
    /// Rule 2: this rate node is missing a flow source or a flow sink.
    RateNodeFlow(NodeId),
    /// Rule 3: this rate or auxiliary node has no formula.
    NoFormula(NodeId),
    /// Rule 4: the auxiliary precedence graph contains a cycle.
    AuxiliaryCycle,
    /// Rule 5: this node is not transitively relevant to any level node.
    UselessNode(NodeId),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::NoLevelNode => {
                write!(f, "no_level_node: a model needs at least one level node")
            }
            ValidationError::RateNodeFlow(id) => {
                write!(f, "rate_node_flow: {id} is missing a flow source or sink")
            }
            ValidationError::NoFormula(id) => {
                write!(f, "no_formula: {id} has no formula set")
            }
            ValidationError::AuxiliaryCycle => {
                write!(f, "auxiliary_cycle: auxiliary formulas form a cycle")
            }
            ValidationError::UselessNode(id) => {
                write!(f, "useless_node: {id} does not influence any level node")
            }
        }
    }
}

impl error::Error for ValidationError {}

pub type ValidationResult = result::Result<(), ValidationError>;

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Model, ErrorCode::$code, None))
    }}
);

#[macro_export]
macro_rules! node_err(
    ($code:tt, $node:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::for_node(ErrorKind::Node, ErrorCode::$code, $node))
    }}
);

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Simulation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, None))
    }};
}

/// Checks a caller-supplied node value against the fixed numeric range.
pub(crate) fn check_value_range(value: f64) -> Result<()> {
    if !value.is_finite() || !(VALUE_MIN..=VALUE_MAX).contains(&value) {
        return model_err!(ValueOutOfRange, format!("{value}"));
    }
    Ok(())
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Model,
        ErrorCode::NotChangeable,
        Some("set_formula".to_string()),
    );
    assert_eq!("ModelError{not_changeable: set_formula}", format!("{err}"));

    let err = Error::for_node(ErrorKind::Node, ErrorCode::FormulaDependency, NodeId(3));
    assert_eq!("NodeError{formula_dependency: n3}", format!("{err}"));

    let err = Error::new(ErrorKind::Simulation, ErrorCode::StillChangeable, None);
    assert_eq!("SimulationError{still_changeable}", format!("{err}"));
}

#[test]
fn test_validation_error_display() {
    let cases: &[(ValidationError, &str)] = &[
        (
            ValidationError::NoLevelNode,
            "no_level_node: a model needs at least one level node",
        ),
        (
            ValidationError::RateNodeFlow(NodeId(1)),
            "rate_node_flow: n1 is missing a flow source or sink",
        ),
        (
            ValidationError::NoFormula(NodeId(2)),
            "no_formula: n2 has no formula set",
        ),
        (
            ValidationError::AuxiliaryCycle,
            "auxiliary_cycle: auxiliary formulas form a cycle",
        ),
        (
            ValidationError::UselessNode(NodeId(7)),
            "useless_node: n7 does not influence any level node",
        ),
    ];
    for (err, expected) in cases {
        assert_eq!(*expected, &format!("{err}"));
    }
}

#[test]
fn test_value_range() {
    assert!(check_value_range(0.0).is_ok());
    assert!(check_value_range(VALUE_MAX).is_ok());
    assert!(check_value_range(VALUE_MIN).is_ok());
    assert!(check_value_range(VALUE_MAX + 1.0).is_err());
    assert!(check_value_range(VALUE_MIN - 1.0).is_err());
    assert!(check_value_range(f64::NAN).is_err());
    assert!(check_value_range(f64::INFINITY).is_err());

    let err = check_value_range(2e9).unwrap_err();
    assert_eq!(ErrorCode::ValueOutOfRange, err.code);
}
