// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use crate::ast::{Expr, RenderStyle, print_eqn};
use crate::common::{NodeId, Result, ValidationResult, check_value_range};
use crate::node::{Node, NodeKind, RateRefs, ValuePolicy};
use crate::validate;
use crate::{model_err, node_err};

/// The aggregate root: owns every node, the flow wiring between them, and
/// the changeable/frozen lifecycle.
///
/// A model starts out changeable.  Structure and values are built up
/// through the factory, flow, and setter operations, then
/// [`validate_and_freeze`] checks the model and irreversibly freezes it;
/// a frozen model only answers queries and advances via [`step`].
///
/// Single-writer: the engine performs no locking, callers serialize access.
///
/// [`validate_and_freeze`]: Model::validate_and_freeze
/// [`step`]: Model::step
#[derive(Clone, Debug)]
pub struct Model {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    next_id: u32,
    changeable: bool,
}

impl Default for Model {
    fn default() -> Self {
        Model::new()
    }
}

impl Model {
    pub fn new() -> Model {
        Model {
            nodes: BTreeMap::new(),
            next_id: 0,
            changeable: true,
        }
    }

    pub fn is_changeable(&self) -> bool {
        self.changeable
    }

    fn ensure_changeable(&self, op: &str) -> Result<()> {
        if !self.changeable {
            return model_err!(NotChangeable, op.to_string());
        }
        Ok(())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&Node> {
        match self.nodes.get(&id) {
            Some(node) => Ok(node),
            None => node_err!(DoesNotExist, id),
        }
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        match self.nodes.get_mut(&id) {
            Some(node) => Ok(node),
            None => node_err!(DoesNotExist, id),
        }
    }

    // === creation ===

    pub fn create_level_node(&mut self, name: &str, start: f64) -> Result<NodeId> {
        self.ensure_changeable("create_level_node")?;
        check_value_range(start)?;
        Ok(self.alloc(Node::Level {
            name: name.to_string(),
            start,
            value: start,
            inflows: RateRefs::new(),
            outflows: RateRefs::new(),
        }))
    }

    pub fn create_rate_node(&mut self, name: &str) -> Result<NodeId> {
        self.ensure_changeable("create_rate_node")?;
        Ok(self.alloc(Node::Rate {
            name: name.to_string(),
            value: 0.0,
            source: None,
            sink: None,
            formula: None,
        }))
    }

    pub fn create_constant_node(&mut self, name: &str, value: f64) -> Result<NodeId> {
        self.create_constant_node_with_policy(name, value, ValuePolicy::Exact)
    }

    pub fn create_constant_node_with_policy(
        &mut self,
        name: &str,
        value: f64,
        policy: ValuePolicy,
    ) -> Result<NodeId> {
        self.ensure_changeable("create_constant_node")?;
        let value = policy.apply(value);
        check_value_range(value)?;
        Ok(self.alloc(Node::Constant {
            name: name.to_string(),
            value,
            policy,
        }))
    }

    pub fn create_auxiliary_node(&mut self, name: &str) -> Result<NodeId> {
        self.ensure_changeable("create_auxiliary_node")?;
        Ok(self.alloc(Node::Auxiliary {
            name: name.to_string(),
            value: 0.0,
            formula: None,
        }))
    }

    pub fn create_source_sink_node(&mut self) -> Result<NodeId> {
        self.ensure_changeable("create_source_sink_node")?;
        Ok(self.alloc(Node::SourceSink {
            inflows: RateRefs::new(),
            outflows: RateRefs::new(),
        }))
    }

    // === flow wiring ===
    //
    // A flow connects {level, source/sink} <-> {rate}, one add/remove pair
    // per direction.  The rate side is a single slot, the endpoint side a
    // mirrored set; the two must agree at all times (checked on removal).

    pub fn add_flow_from_level_to_rate(&mut self, level: NodeId, rate: NodeId) -> Result<bool> {
        self.ensure_changeable("add_flow_from_level_to_rate")?;
        self.add_flow_into_rate(level, rate, NodeKind::Level)
    }

    pub fn add_flow_from_rate_to_level(&mut self, rate: NodeId, level: NodeId) -> Result<bool> {
        self.ensure_changeable("add_flow_from_rate_to_level")?;
        self.add_flow_out_of_rate(rate, level, NodeKind::Level)
    }

    pub fn add_flow_from_source_sink_to_rate(
        &mut self,
        source_sink: NodeId,
        rate: NodeId,
    ) -> Result<bool> {
        self.ensure_changeable("add_flow_from_source_sink_to_rate")?;
        self.add_flow_into_rate(source_sink, rate, NodeKind::SourceSink)
    }

    pub fn add_flow_from_rate_to_source_sink(
        &mut self,
        rate: NodeId,
        source_sink: NodeId,
    ) -> Result<bool> {
        self.ensure_changeable("add_flow_from_rate_to_source_sink")?;
        self.add_flow_out_of_rate(rate, source_sink, NodeKind::SourceSink)
    }

    pub fn remove_flow_from_level_to_rate(&mut self, level: NodeId, rate: NodeId) -> Result<bool> {
        self.ensure_changeable("remove_flow_from_level_to_rate")?;
        self.remove_flow_into_rate(level, rate, NodeKind::Level)
    }

    pub fn remove_flow_from_rate_to_level(&mut self, rate: NodeId, level: NodeId) -> Result<bool> {
        self.ensure_changeable("remove_flow_from_rate_to_level")?;
        self.remove_flow_out_of_rate(rate, level, NodeKind::Level)
    }

    pub fn remove_flow_from_source_sink_to_rate(
        &mut self,
        source_sink: NodeId,
        rate: NodeId,
    ) -> Result<bool> {
        self.ensure_changeable("remove_flow_from_source_sink_to_rate")?;
        self.remove_flow_into_rate(source_sink, rate, NodeKind::SourceSink)
    }

    pub fn remove_flow_from_rate_to_source_sink(
        &mut self,
        rate: NodeId,
        source_sink: NodeId,
    ) -> Result<bool> {
        self.ensure_changeable("remove_flow_from_rate_to_source_sink")?;
        self.remove_flow_out_of_rate(rate, source_sink, NodeKind::SourceSink)
    }

    fn check_flow_pair(&self, endpoint: NodeId, rate: NodeId, want: NodeKind) -> Result<()> {
        if self.get(endpoint)?.kind() != want {
            return node_err!(WrongNodeType, endpoint);
        }
        if !self.get(rate)?.is_rate() {
            return node_err!(WrongNodeType, rate);
        }
        Ok(())
    }

    /// endpoint -> rate: fills the rate's flow-source slot.
    fn add_flow_into_rate(&mut self, endpoint: NodeId, rate: NodeId, want: NodeKind) -> Result<bool> {
        self.check_flow_pair(endpoint, rate, want)?;
        if let Node::Rate { source, .. } = self.get(rate)? {
            if source.is_some() {
                return Ok(false);
            }
        }
        if let Node::Rate { source, .. } = self.get_mut(rate)? {
            *source = Some(endpoint);
        }
        self.get_mut(endpoint)?
            .outflows_mut()
            .unwrap_or_else(|| unreachable!())
            .push(rate);
        Ok(true)
    }

    /// rate -> endpoint: fills the rate's flow-sink slot.
    fn add_flow_out_of_rate(&mut self, rate: NodeId, endpoint: NodeId, want: NodeKind) -> Result<bool> {
        self.check_flow_pair(endpoint, rate, want)?;
        if let Node::Rate { sink, .. } = self.get(rate)? {
            if sink.is_some() {
                return Ok(false);
            }
        }
        if let Node::Rate { sink, .. } = self.get_mut(rate)? {
            *sink = Some(endpoint);
        }
        self.get_mut(endpoint)?
            .inflows_mut()
            .unwrap_or_else(|| unreachable!())
            .push(rate);
        Ok(true)
    }

    fn remove_flow_into_rate(
        &mut self,
        endpoint: NodeId,
        rate: NodeId,
        want: NodeKind,
    ) -> Result<bool> {
        self.check_flow_pair(endpoint, rate, want)?;
        let in_slot = matches!(self.get(rate)?, Node::Rate { source: Some(s), .. } if *s == endpoint);
        let in_set = self
            .get(endpoint)?
            .outflows()
            .unwrap_or_else(|| unreachable!())
            .contains(&rate);
        if !in_slot && !in_set {
            return Ok(false);
        }
        if in_slot != in_set {
            return model_err!(InconsistentFlow, format!("{endpoint} -> {rate}"));
        }
        if let Node::Rate { source, .. } = self.get_mut(rate)? {
            *source = None;
        }
        self.get_mut(endpoint)?
            .outflows_mut()
            .unwrap_or_else(|| unreachable!())
            .retain(|r| *r != rate);
        Ok(true)
    }

    fn remove_flow_out_of_rate(
        &mut self,
        rate: NodeId,
        endpoint: NodeId,
        want: NodeKind,
    ) -> Result<bool> {
        self.check_flow_pair(endpoint, rate, want)?;
        let in_slot = matches!(self.get(rate)?, Node::Rate { sink: Some(s), .. } if *s == endpoint);
        let in_set = self
            .get(endpoint)?
            .inflows()
            .unwrap_or_else(|| unreachable!())
            .contains(&rate);
        if !in_slot && !in_set {
            return Ok(false);
        }
        if in_slot != in_set {
            return model_err!(InconsistentFlow, format!("{rate} -> {endpoint}"));
        }
        if let Node::Rate { sink, .. } = self.get_mut(rate)? {
            *sink = None;
        }
        self.get_mut(endpoint)?
            .inflows_mut()
            .unwrap_or_else(|| unreachable!())
            .retain(|r| *r != rate);
        Ok(true)
    }

    // === mutation ===

    pub fn set_node_name(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.ensure_changeable("set_node_name")?;
        match self.get_mut(id)? {
            Node::Level { name: n, .. }
            | Node::Rate { name: n, .. }
            | Node::Constant { name: n, .. }
            | Node::Auxiliary { name: n, .. } => {
                *n = name.to_string();
                Ok(())
            }
            Node::SourceSink { .. } => node_err!(NotNamed, id),
        }
    }

    /// Sets a level's start value; while the model is changeable the
    /// current value tracks the start value.
    pub fn set_start_value(&mut self, id: NodeId, start: f64) -> Result<()> {
        self.ensure_changeable("set_start_value")?;
        check_value_range(start)?;
        match self.get_mut(id)? {
            Node::Level { start: s, value, .. } => {
                *s = start;
                *value = start;
                Ok(())
            }
            _ => node_err!(WrongNodeType, id),
        }
    }

    pub fn set_constant_value(&mut self, id: NodeId, value: f64) -> Result<()> {
        self.ensure_changeable("set_constant_value")?;
        let policy = match self.get(id)? {
            Node::Constant { policy, .. } => *policy,
            _ => return node_err!(WrongNodeType, id),
        };
        let value = policy.apply(value);
        check_value_range(value)?;
        if let Node::Constant { value: v, .. } = self.get_mut(id)? {
            *v = value;
        }
        Ok(())
    }

    /// Sets the formula on a rate or auxiliary node.  Every leaf must
    /// reference an existing level, constant, or auxiliary node.
    pub fn set_formula(&mut self, id: NodeId, formula: Expr) -> Result<()> {
        self.ensure_changeable("set_formula")?;
        match self.get(id)? {
            Node::Rate { .. } | Node::Auxiliary { .. } => {}
            _ => return node_err!(WrongNodeType, id),
        }
        for dep in formula.dependencies() {
            match self.nodes.get(&dep) {
                Some(node) if node.is_formula_referenceable() => {}
                _ => return node_err!(BadFormulaRef, dep),
            }
        }
        match self.get_mut(id)? {
            Node::Rate { formula: f, .. } | Node::Auxiliary { formula: f, .. } => {
                *f = Some(formula);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    // === structural removal ===

    /// Removes a node, cascading flow detachment.  Refused (and the model
    /// left entirely unchanged) if any other rate or auxiliary node's
    /// formula references it; the error carries the referencing node.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        self.ensure_changeable("remove_node")?;
        self.get(id)?;

        for (other, node) in self.nodes.iter() {
            if *other == id {
                continue;
            }
            if let Some(formula) = node.formula() {
                if formula.dependencies().contains(&id) {
                    return node_err!(FormulaDependency, *other);
                }
            }
        }

        match self.nodes[&id].clone() {
            Node::Level {
                inflows, outflows, ..
            }
            | Node::SourceSink { inflows, outflows } => {
                for rate in inflows {
                    if let Node::Rate { sink, .. } = self.get_mut(rate)? {
                        *sink = None;
                    }
                }
                for rate in outflows {
                    if let Node::Rate { source, .. } = self.get_mut(rate)? {
                        *source = None;
                    }
                }
            }
            Node::Rate { source, sink, .. } => {
                if let Some(endpoint) = source {
                    self.get_mut(endpoint)?
                        .outflows_mut()
                        .unwrap_or_else(|| unreachable!())
                        .retain(|r| *r != id);
                }
                if let Some(endpoint) = sink {
                    self.get_mut(endpoint)?
                        .inflows_mut()
                        .unwrap_or_else(|| unreachable!())
                        .retain(|r| *r != id);
                }
            }
            Node::Constant { .. } | Node::Auxiliary { .. } => {}
        }

        self.nodes.remove(&id);
        Ok(())
    }

    // === validation & lifecycle ===

    /// Runs the ordered validation rules; pure, no mutation.
    pub fn validate(&self) -> ValidationResult {
        validate::validate(self)
    }

    /// Runs [`validate`] and, on success, permanently freezes the model.
    /// There is no unfreeze.
    ///
    /// [`validate`]: Model::validate
    pub fn validate_and_freeze(&mut self) -> ValidationResult {
        validate::validate(self)?;
        self.changeable = false;
        Ok(())
    }

    // === queries ===

    fn ids_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.kind() == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Level node ids in creation order; a defensive copy.
    pub fn level_nodes(&self) -> Vec<NodeId> {
        self.ids_of_kind(NodeKind::Level)
    }

    pub fn rate_nodes(&self) -> Vec<NodeId> {
        self.ids_of_kind(NodeKind::Rate)
    }

    pub fn constant_nodes(&self) -> Vec<NodeId> {
        self.ids_of_kind(NodeKind::Constant)
    }

    pub fn auxiliary_nodes(&self) -> Vec<NodeId> {
        self.ids_of_kind(NodeKind::Auxiliary)
    }

    pub fn source_sink_nodes(&self) -> Vec<NodeId> {
        self.ids_of_kind(NodeKind::SourceSink)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).map(Node::kind)
    }

    /// A node's display name; asking a source/sink node is a contract
    /// violation (`NotNamed`).
    pub fn node_name(&self, id: NodeId) -> Result<&str> {
        match self.get(id)?.name() {
            Some(name) => Ok(name),
            None => node_err!(NotNamed, id),
        }
    }

    /// A node's current value; asking a source/sink node is a contract
    /// violation (`NoValue`).
    pub fn value(&self, id: NodeId) -> Result<f64> {
        match self.get(id)?.value() {
            Some(value) => Ok(value),
            None => node_err!(NoValue, id),
        }
    }

    pub fn start_value(&self, id: NodeId) -> Result<f64> {
        match self.get(id)? {
            Node::Level { start, .. } => Ok(*start),
            _ => node_err!(WrongNodeType, id),
        }
    }

    pub fn formula(&self, id: NodeId) -> Option<&Expr> {
        self.nodes.get(&id).and_then(Node::formula)
    }

    pub fn flow_source(&self, id: NodeId) -> Result<Option<NodeId>> {
        match self.get(id)? {
            Node::Rate { source, .. } => Ok(*source),
            _ => node_err!(WrongNodeType, id),
        }
    }

    pub fn flow_sink(&self, id: NodeId) -> Result<Option<NodeId>> {
        match self.get(id)? {
            Node::Rate { sink, .. } => Ok(*sink),
            _ => node_err!(WrongNodeType, id),
        }
    }

    /// Renders the formula of a rate or auxiliary node; `Ok(None)` when
    /// the node has no formula.
    pub fn render_formula(&self, id: NodeId, style: RenderStyle) -> Result<Option<String>> {
        match self.get(id)? {
            Node::Rate { formula, .. } | Node::Auxiliary { formula, .. } => Ok(formula
                .as_ref()
                .map(|f| print_eqn(f, style, &|nid| self.display_name(nid)))),
            _ => node_err!(WrongNodeType, id),
        }
    }

    pub(crate) fn display_name(&self, id: NodeId) -> String {
        match self.nodes.get(&id).and_then(Node::name) {
            Some(name) => name.to_string(),
            None => format!("{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    fn simple_model() -> (Model, NodeId, NodeId, NodeId) {
        let mut model = Model::new();
        let level = model.create_level_node("population", 100.0).unwrap();
        let rate = model.create_rate_node("deaths").unwrap();
        let constant = model.create_constant_node("death_rate", 5.0).unwrap();
        (model, level, rate, constant)
    }

    #[test]
    fn test_creation_and_queries() {
        let (model, level, rate, constant) = simple_model();
        assert!(model.is_changeable());
        assert_eq!(vec![level], model.level_nodes());
        assert_eq!(vec![rate], model.rate_nodes());
        assert_eq!(vec![constant], model.constant_nodes());
        assert!(model.auxiliary_nodes().is_empty());
        assert_eq!("population", model.node_name(level).unwrap());
        assert_eq!(100.0, model.value(level).unwrap());
        assert_eq!(100.0, model.start_value(level).unwrap());
        assert_eq!(0.0, model.value(rate).unwrap());
        assert_eq!(5.0, model.value(constant).unwrap());
    }

    #[test]
    fn test_source_sink_has_no_name_or_value() {
        let mut model = Model::new();
        let junction = model.create_source_sink_node().unwrap();
        assert_eq!(
            ErrorCode::NotNamed,
            model.node_name(junction).unwrap_err().code
        );
        assert_eq!(ErrorCode::NoValue, model.value(junction).unwrap_err().code);
        assert_eq!(
            ErrorCode::NotNamed,
            model.set_node_name(junction, "x").unwrap_err().code
        );
    }

    #[test]
    fn test_creation_value_range() {
        let mut model = Model::new();
        assert_eq!(
            ErrorCode::ValueOutOfRange,
            model.create_level_node("l", 2e9).unwrap_err().code
        );
        assert_eq!(
            ErrorCode::ValueOutOfRange,
            model.create_constant_node("c", -2e9).unwrap_err().code
        );
        let level = model.create_level_node("l", 0.0).unwrap();
        assert_eq!(
            ErrorCode::ValueOutOfRange,
            model.set_start_value(level, f64::NAN).unwrap_err().code
        );
        // the failed set left the model untouched
        assert_eq!(0.0, model.start_value(level).unwrap());
    }

    #[test]
    fn test_constant_policy() {
        let mut model = Model::new();
        let c = model
            .create_constant_node_with_policy("c", 1.4, ValuePolicy::Rounded)
            .unwrap();
        assert_eq!(1.0, model.value(c).unwrap());
        model.set_constant_value(c, 2.6).unwrap();
        assert_eq!(3.0, model.value(c).unwrap());

        let exact = model.create_constant_node("e", 1.4).unwrap();
        assert_eq!(1.4, model.value(exact).unwrap());
    }

    #[test]
    fn test_flow_slot_occupied_returns_false() {
        let (mut model, level, rate, _) = simple_model();
        let other = model.create_level_node("other", 1.0).unwrap();

        assert!(model.add_flow_from_level_to_rate(level, rate).unwrap());
        // occupied slot: no mutation, no error
        assert!(!model.add_flow_from_level_to_rate(other, rate).unwrap());
        assert_eq!(Some(level), model.flow_source(rate).unwrap());
        assert!(model.node(other).unwrap().outflows().unwrap().is_empty());

        assert!(model.add_flow_from_rate_to_level(rate, other).unwrap());
        assert!(!model.add_flow_from_rate_to_level(rate, level).unwrap());
        assert_eq!(Some(other), model.flow_sink(rate).unwrap());
    }

    #[test]
    fn test_flow_remove() {
        let (mut model, level, rate, _) = simple_model();
        let junction = model.create_source_sink_node().unwrap();

        assert!(model.add_flow_from_level_to_rate(level, rate).unwrap());
        assert!(model.add_flow_from_rate_to_source_sink(rate, junction).unwrap());

        // removing a missing flow is Ok(false)
        assert!(!model.remove_flow_from_rate_to_level(rate, level).unwrap());

        assert!(model.remove_flow_from_level_to_rate(level, rate).unwrap());
        assert_eq!(None, model.flow_source(rate).unwrap());
        assert!(model.node(level).unwrap().outflows().unwrap().is_empty());
        // second removal: gone already
        assert!(!model.remove_flow_from_level_to_rate(level, rate).unwrap());

        assert!(model
            .remove_flow_from_rate_to_source_sink(rate, junction)
            .unwrap());
        assert_eq!(None, model.flow_sink(rate).unwrap());
    }

    #[test]
    fn test_flow_type_checks() {
        let (mut model, level, rate, constant) = simple_model();
        assert_eq!(
            ErrorCode::WrongNodeType,
            model
                .add_flow_from_level_to_rate(constant, rate)
                .unwrap_err()
                .code
        );
        assert_eq!(
            ErrorCode::WrongNodeType,
            model
                .add_flow_from_level_to_rate(level, constant)
                .unwrap_err()
                .code
        );
        assert_eq!(
            ErrorCode::DoesNotExist,
            model
                .add_flow_from_level_to_rate(NodeId(99), rate)
                .unwrap_err()
                .code
        );
    }

    #[test]
    fn test_set_formula_type_checks() {
        let (mut model, level, rate, constant) = simple_model();
        assert_eq!(
            ErrorCode::WrongNodeType,
            model
                .set_formula(level, Expr::Ref(constant))
                .unwrap_err()
                .code
        );
        // leaf referencing a rate is rejected
        assert_eq!(
            ErrorCode::BadFormulaRef,
            model.set_formula(rate, Expr::Ref(rate)).unwrap_err().code
        );
        // leaf referencing an unknown id is rejected
        assert_eq!(
            ErrorCode::BadFormulaRef,
            model
                .set_formula(rate, Expr::Ref(NodeId(42)))
                .unwrap_err()
                .code
        );
        model.set_formula(rate, Expr::Ref(constant)).unwrap();
        assert!(model.formula(rate).is_some());
    }

    #[test]
    fn test_remove_node_refused_when_referenced() {
        let (mut model, _level, rate, constant) = simple_model();
        model.set_formula(rate, Expr::Ref(constant)).unwrap();

        let err = model.remove_node(constant).unwrap_err();
        assert_eq!(ErrorCode::FormulaDependency, err.code);
        assert_eq!(Some(rate), err.node);
        // refusal left everything in place
        assert!(model.node(constant).is_some());
        assert!(model.formula(rate).is_some());
    }

    #[test]
    fn test_remove_node_cascades_flows() {
        let (mut model, level, rate, _) = simple_model();
        let junction = model.create_source_sink_node().unwrap();
        assert!(model.add_flow_from_level_to_rate(level, rate).unwrap());
        assert!(model.add_flow_from_rate_to_source_sink(rate, junction).unwrap());

        model.remove_node(rate).unwrap();
        assert!(model.node(rate).is_none());
        assert!(model.node(level).unwrap().outflows().unwrap().is_empty());
        assert!(model.node(junction).unwrap().inflows().unwrap().is_empty());

        // removing an endpoint clears the rate slots
        let rate2 = model.create_rate_node("r2").unwrap();
        assert!(model.add_flow_from_level_to_rate(level, rate2).unwrap());
        model.remove_node(level).unwrap();
        assert_eq!(None, model.flow_source(rate2).unwrap());
    }

    #[test]
    fn test_frozen_model_rejects_mutation() {
        let mut model = Model::new();
        let level = model.create_level_node("l", 1.0).unwrap();
        let rate = model.create_rate_node("r").unwrap();
        let constant = model.create_constant_node("c", 1.0).unwrap();
        let junction = model.create_source_sink_node().unwrap();
        model.add_flow_from_level_to_rate(level, rate).unwrap();
        model
            .add_flow_from_rate_to_source_sink(rate, junction)
            .unwrap();
        model.set_formula(rate, Expr::Ref(constant)).unwrap();
        model.validate_and_freeze().unwrap();
        assert!(!model.is_changeable());

        assert_eq!(
            ErrorCode::NotChangeable,
            model.create_rate_node("r2").unwrap_err().code
        );
        assert_eq!(
            ErrorCode::NotChangeable,
            model.set_node_name(level, "x").unwrap_err().code
        );
        assert_eq!(
            ErrorCode::NotChangeable,
            model.remove_node(constant).unwrap_err().code
        );
        assert_eq!(
            ErrorCode::NotChangeable,
            model
                .remove_flow_from_level_to_rate(level, rate)
                .unwrap_err()
                .code
        );
        // queries still work
        assert_eq!("l", model.node_name(level).unwrap());
    }

    #[test]
    fn test_render_formula() {
        let (mut model, level, rate, constant) = simple_model();
        model
            .set_formula(rate, Expr::mul(Expr::Ref(level), Expr::Ref(constant)))
            .unwrap();
        assert_eq!(
            Some("(population * death_rate)".to_string()),
            model
                .render_formula(rate, RenderStyle::Parenthesized)
                .unwrap()
        );
        assert_eq!(
            Some(format!("{level} * {constant}")),
            model.render_formula(rate, RenderStyle::Abbreviated).unwrap()
        );
        let aux = model.create_auxiliary_node("a").unwrap();
        assert_eq!(None, model.render_formula(aux, RenderStyle::Parenthesized).unwrap());
    }
}
