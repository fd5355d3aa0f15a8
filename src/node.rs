// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ast::Expr;
use crate::common::NodeId;

// a level or source/sink endpoint rarely has more than a couple of
// attached rates
pub(crate) type RateRefs = SmallVec<[NodeId; 2]>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Level,
    Rate,
    Constant,
    Auxiliary,
    SourceSink,
}

/// Normalization applied to a constant's value on creation and on every
/// `set_constant_value`.  An input-boundary policy that lives on the node,
/// not a distinct node kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValuePolicy {
    Exact,
    Rounded,
}

impl ValuePolicy {
    pub(crate) fn apply(&self, value: f64) -> f64 {
        match self {
            ValuePolicy::Exact => value,
            ValuePolicy::Rounded => value.round(),
        }
    }
}

/// A node in the stock and flow graph.  Nodes are plain records owned by
/// the [`Model`] arena and addressed by [`NodeId`]; the model is the sole
/// mutator.
///
/// [`Model`]: crate::Model
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A stock: integrates net flow each step.
    Level {
        name: String,
        start: f64,
        value: f64,
        /// rates whose flow sink is this level
        inflows: RateRefs,
        /// rates whose flow source is this level
        outflows: RateRefs,
    },
    /// A flow: recomputed from its formula each step, moving value from
    /// its source endpoint to its sink endpoint.
    Rate {
        name: String,
        value: f64,
        source: Option<NodeId>,
        sink: Option<NodeId>,
        formula: Option<Expr>,
    },
    /// A fixed value, never recomputed.
    Constant {
        name: String,
        value: f64,
        policy: ValuePolicy,
    },
    /// A derived quantity; between steps its value is stale from the
    /// previous step, not recomputed on demand.
    Auxiliary {
        name: String,
        value: f64,
        formula: Option<Expr>,
    },
    /// A structural boundary: anonymous, valueless junction letting a rate
    /// have a flow endpoint with no associated stock.
    SourceSink {
        /// rates whose flow sink is this junction
        inflows: RateRefs,
        /// rates whose flow source is this junction
        outflows: RateRefs,
    },
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Level { .. } => NodeKind::Level,
            Node::Rate { .. } => NodeKind::Rate,
            Node::Constant { .. } => NodeKind::Constant,
            Node::Auxiliary { .. } => NodeKind::Auxiliary,
            Node::SourceSink { .. } => NodeKind::SourceSink,
        }
    }

    /// `None` for source/sink nodes, which are anonymous.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Level { name, .. }
            | Node::Rate { name, .. }
            | Node::Constant { name, .. }
            | Node::Auxiliary { name, .. } => Some(name),
            Node::SourceSink { .. } => None,
        }
    }

    /// `None` for source/sink nodes, which carry no value.
    pub fn value(&self) -> Option<f64> {
        match self {
            Node::Level { value, .. }
            | Node::Rate { value, .. }
            | Node::Constant { value, .. }
            | Node::Auxiliary { value, .. } => Some(*value),
            Node::SourceSink { .. } => None,
        }
    }

    pub fn formula(&self) -> Option<&Expr> {
        match self {
            Node::Rate {
                formula: Some(formula),
                ..
            }
            | Node::Auxiliary {
                formula: Some(formula),
                ..
            } => Some(formula),
            _ => None,
        }
    }

    pub fn is_level(&self) -> bool {
        matches!(self, Node::Level { .. })
    }

    pub fn is_rate(&self) -> bool {
        matches!(self, Node::Rate { .. })
    }

    pub fn is_auxiliary(&self) -> bool {
        matches!(self, Node::Auxiliary { .. })
    }

    /// Whether this node's kind may appear as a formula leaf.
    pub(crate) fn is_formula_referenceable(&self) -> bool {
        matches!(
            self,
            Node::Level { .. } | Node::Constant { .. } | Node::Auxiliary { .. }
        )
    }

    /// Whether this node's kind may be a flow endpoint opposite a rate.
    pub(crate) fn is_flow_endpoint(&self) -> bool {
        matches!(self, Node::Level { .. } | Node::SourceSink { .. })
    }

    /// Rates flowing into this endpoint (level or source/sink).
    pub(crate) fn inflows(&self) -> Option<&RateRefs> {
        match self {
            Node::Level { inflows, .. } | Node::SourceSink { inflows, .. } => Some(inflows),
            _ => None,
        }
    }

    /// Rates flowing out of this endpoint (level or source/sink).
    pub(crate) fn outflows(&self) -> Option<&RateRefs> {
        match self {
            Node::Level { outflows, .. } | Node::SourceSink { outflows, .. } => Some(outflows),
            _ => None,
        }
    }

    pub(crate) fn inflows_mut(&mut self) -> Option<&mut RateRefs> {
        match self {
            Node::Level { inflows, .. } | Node::SourceSink { inflows, .. } => Some(inflows),
            _ => None,
        }
    }

    pub(crate) fn outflows_mut(&mut self) -> Option<&mut RateRefs> {
        match self {
            Node::Level { outflows, .. } | Node::SourceSink { outflows, .. } => Some(outflows),
            _ => None,
        }
    }

    pub(crate) fn set_value(&mut self, new_value: f64) {
        match self {
            Node::Level { value, .. }
            | Node::Rate { value, .. }
            | Node::Constant { value, .. }
            | Node::Auxiliary { value, .. } => *value = new_value,
            Node::SourceSink { .. } => unreachable!("source/sink nodes carry no value"),
        }
    }
}
