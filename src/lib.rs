// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A stock and flow system dynamics engine: a graph of typed nodes
//! (levels, rates, constants, auxiliaries, source/sinks) connected by
//! flows, where rate and auxiliary nodes carry small arithmetic formulas
//! referencing other nodes.  A [`Model`] is built up while changeable,
//! validated and frozen, then advanced through discrete time steps.

#![forbid(unsafe_code)]

mod ast;
pub mod common;
mod model;
mod node;
mod results;
mod sim;
mod validate;

pub use self::ast::{BinaryOp, Expr, RenderStyle, Visitor, print_eqn};
pub use self::common::{
    Error, ErrorCode, ErrorKind, NodeId, Result, VALUE_MAX, VALUE_MIN, ValidationError,
    ValidationResult,
};
pub use self::model::Model;
pub use self::node::{Node, NodeKind, ValuePolicy};
pub use self::results::Results;
