// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::common::{NodeId, ValidationError, ValidationResult};
use crate::model::Model;
use crate::node::Node;

/// The auxiliary precedence graph: for each auxiliary node B, the set of
/// auxiliary nodes A that B's formula directly references (A must be
/// evaluated before B).  Keys cover every auxiliary, in creation order.
pub(crate) fn auxiliary_dependencies(model: &Model) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
    model
        .nodes
        .iter()
        .filter(|(_, node)| node.is_auxiliary())
        .map(|(id, node)| {
            let deps = match node.formula() {
                Some(formula) => formula
                    .dependencies()
                    .into_iter()
                    .filter(|dep| {
                        model
                            .nodes
                            .get(dep)
                            .map(Node::is_auxiliary)
                            .unwrap_or(false)
                    })
                    .collect(),
                None => BTreeSet::new(),
            };
            (*id, deps)
        })
        .collect()
}

/// Runs the ordered validation rules; the first violated rule's error is
/// returned and no later rule is evaluated.
pub(crate) fn validate(model: &Model) -> ValidationResult {
    // rule 1: at least one level node exists
    if model.level_nodes().is_empty() {
        return Err(ValidationError::NoLevelNode);
    }

    // rule 2: every rate node has both a flow source and a flow sink
    for id in model.rate_nodes() {
        if let Some(Node::Rate { source, sink, .. }) = model.nodes.get(&id) {
            if source.is_none() || sink.is_none() {
                return Err(ValidationError::RateNodeFlow(id));
            }
        }
    }

    // rule 3: every rate, then every auxiliary, has a formula
    for id in model.rate_nodes().into_iter().chain(model.auxiliary_nodes()) {
        if model.nodes[&id].formula().is_none() {
            return Err(ValidationError::NoFormula(id));
        }
    }

    // rule 4: the auxiliary precedence graph is acyclic
    let deps = auxiliary_dependencies(model);
    if has_cycle(&deps) {
        return Err(ValidationError::AuxiliaryCycle);
    }

    // rule 5: every constant, auxiliary, and source/sink node is
    // transitively relevant to some level node
    let relevant = relevant_closure(model);
    for (id, node) in model.nodes.iter() {
        let must_be_relevant = matches!(
            node,
            Node::Constant { .. } | Node::Auxiliary { .. } | Node::SourceSink { .. }
        );
        if must_be_relevant && !relevant.contains(id) {
            return Err(ValidationError::UselessNode(*id));
        }
    }

    Ok(())
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

// depth-first search with three-color marking; an edge back to an
// in-progress (gray) node is a cycle
fn has_cycle(deps: &BTreeMap<NodeId, BTreeSet<NodeId>>) -> bool {
    fn visit(
        id: NodeId,
        deps: &BTreeMap<NodeId, BTreeSet<NodeId>>,
        colors: &mut BTreeMap<NodeId, Color>,
    ) -> bool {
        colors.insert(id, Color::Gray);
        for dep in deps[&id].iter() {
            match colors[dep] {
                Color::Gray => return true,
                Color::White => {
                    if visit(*dep, deps, colors) {
                        return true;
                    }
                }
                Color::Black => {}
            }
        }
        colors.insert(id, Color::Black);
        false
    }

    let mut colors: BTreeMap<NodeId, Color> =
        deps.keys().map(|id| (*id, Color::White)).collect();
    for id in deps.keys() {
        if colors[id] == Color::White && visit(*id, deps, &mut colors) {
            return true;
        }
    }
    false
}

// the set of nodes transitively relevant to some level node: seeded with
// the rates directly attached to a level, then expanded through rate
// formula dependencies and flow endpoints and through auxiliary formula
// dependencies, to closure
fn relevant_closure(model: &Model) -> BTreeSet<NodeId> {
    let mut relevant: BTreeSet<NodeId> = BTreeSet::new();
    let mut work: VecDeque<NodeId> = VecDeque::new();

    let mut discover =
        |id: NodeId, relevant: &mut BTreeSet<NodeId>, work: &mut VecDeque<NodeId>| {
            if relevant.insert(id) {
                work.push_back(id);
            }
        };

    for id in model.level_nodes() {
        let node = &model.nodes[&id];
        for rate in node.inflows().into_iter().flatten() {
            discover(*rate, &mut relevant, &mut work);
        }
        for rate in node.outflows().into_iter().flatten() {
            discover(*rate, &mut relevant, &mut work);
        }
    }

    while let Some(id) = work.pop_front() {
        match &model.nodes[&id] {
            Node::Rate {
                source,
                sink,
                formula,
                ..
            } => {
                if let Some(formula) = formula {
                    for dep in formula.dependencies() {
                        discover(dep, &mut relevant, &mut work);
                    }
                }
                for endpoint in source.iter().chain(sink.iter()) {
                    discover(*endpoint, &mut relevant, &mut work);
                }
            }
            Node::Auxiliary {
                formula: Some(formula),
                ..
            } => {
                for dep in formula.dependencies() {
                    discover(dep, &mut relevant, &mut work);
                }
            }
            _ => {}
        }
    }

    relevant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    // level -> rate -> source/sink, rate formula = constant
    fn valid_model() -> (Model, NodeId, NodeId, NodeId, NodeId) {
        let mut model = Model::new();
        let level = model.create_level_node("stock", 100.0).unwrap();
        let rate = model.create_rate_node("drain").unwrap();
        let constant = model.create_constant_node("c", 5.0).unwrap();
        let junction = model.create_source_sink_node().unwrap();
        model.add_flow_from_level_to_rate(level, rate).unwrap();
        model
            .add_flow_from_rate_to_source_sink(rate, junction)
            .unwrap();
        model.set_formula(rate, Expr::Ref(constant)).unwrap();
        (model, level, rate, constant, junction)
    }

    #[test]
    fn test_valid_model_passes_and_is_idempotent() {
        let (model, ..) = valid_model();
        assert_eq!(Ok(()), model.validate());
        // validate performs checks only; calling again succeeds
        assert_eq!(Ok(()), model.validate());
        assert!(model.is_changeable());
    }

    #[test]
    fn test_rule1_no_level_node() {
        let model = Model::new();
        assert_eq!(Err(ValidationError::NoLevelNode), model.validate());
    }

    #[test]
    fn test_rule_priority_no_level_wins_over_no_formula() {
        let mut model = Model::new();
        // a rate node with no formula and no flows, but rule 1 fires first
        model.create_rate_node("r").unwrap();
        assert_eq!(Err(ValidationError::NoLevelNode), model.validate());
    }

    #[test]
    fn test_rule2_rate_node_flow() {
        let mut model = Model::new();
        let level = model.create_level_node("stock", 1.0).unwrap();
        let rate = model.create_rate_node("r").unwrap();
        assert_eq!(Err(ValidationError::RateNodeFlow(rate)), model.validate());

        // half-wired rate still fails
        model.add_flow_from_level_to_rate(level, rate).unwrap();
        assert_eq!(Err(ValidationError::RateNodeFlow(rate)), model.validate());
    }

    #[test]
    fn test_rule3_no_formula() {
        let mut model = Model::new();
        let level = model.create_level_node("stock", 1.0).unwrap();
        let rate = model.create_rate_node("r").unwrap();
        let junction = model.create_source_sink_node().unwrap();
        model.add_flow_from_level_to_rate(level, rate).unwrap();
        model
            .add_flow_from_rate_to_source_sink(rate, junction)
            .unwrap();
        assert_eq!(Err(ValidationError::NoFormula(rate)), model.validate());

        model.set_formula(rate, Expr::Ref(level)).unwrap();
        let aux = model.create_auxiliary_node("a").unwrap();
        assert_eq!(Err(ValidationError::NoFormula(aux)), model.validate());
    }

    #[test]
    fn test_rule4_auxiliary_cycle() {
        let (mut model, _, rate, _, _) = valid_model();
        let a = model.create_auxiliary_node("a").unwrap();
        let b = model.create_auxiliary_node("b").unwrap();
        model.set_formula(a, Expr::Ref(b)).unwrap();
        model.set_formula(b, Expr::Ref(a)).unwrap();
        // reference the pair from the rate so rule 5 would not also fire
        model
            .set_formula(rate, Expr::add(Expr::Ref(a), Expr::Ref(b)))
            .unwrap();
        assert_eq!(Err(ValidationError::AuxiliaryCycle), model.validate());
    }

    #[test]
    fn test_rule4_chain_is_fine() {
        let (mut model, _, rate, constant, _) = valid_model();
        let a = model.create_auxiliary_node("a").unwrap();
        let b = model.create_auxiliary_node("b").unwrap();
        let c = model.create_auxiliary_node("c").unwrap();
        // a references b, b references c, c references nothing but a constant
        model.set_formula(a, Expr::Ref(b)).unwrap();
        model.set_formula(b, Expr::Ref(c)).unwrap();
        model.set_formula(c, Expr::Ref(constant)).unwrap();
        model.set_formula(rate, Expr::Ref(a)).unwrap();
        assert_eq!(Ok(()), model.validate());
    }

    #[test]
    fn test_rule5_useless_constant() {
        let (mut model, ..) = valid_model();
        let orphan = model.create_constant_node("orphan", 1.0).unwrap();
        assert_eq!(Err(ValidationError::UselessNode(orphan)), model.validate());
    }

    #[test]
    fn test_rule5_useless_auxiliary_and_source_sink() {
        let (mut model, _, _, constant, _) = valid_model();
        let aux = model.create_auxiliary_node("a").unwrap();
        model.set_formula(aux, Expr::Ref(constant)).unwrap();
        assert_eq!(Err(ValidationError::UselessNode(aux)), model.validate());

        // an auxiliary pulled in through the rate formula is fine, but a
        // dangling junction is not
        let (mut model, _, rate, constant, _) = valid_model();
        let aux = model.create_auxiliary_node("a").unwrap();
        model.set_formula(aux, Expr::Ref(constant)).unwrap();
        model.set_formula(rate, Expr::Ref(aux)).unwrap();
        assert_eq!(Ok(()), model.validate());

        let orphan = model.create_source_sink_node().unwrap();
        assert_eq!(Err(ValidationError::UselessNode(orphan)), model.validate());
    }

    #[test]
    fn test_rule5_unconnected_level_is_legal() {
        let (mut model, ..) = valid_model();
        model.create_level_node("idle", 0.0).unwrap();
        assert_eq!(Ok(()), model.validate());
    }

    #[test]
    fn test_auxiliary_dependencies_filters_non_aux() {
        let (mut model, level, rate, constant, _) = valid_model();
        let a = model.create_auxiliary_node("a").unwrap();
        let b = model.create_auxiliary_node("b").unwrap();
        model
            .set_formula(
                b,
                Expr::add(Expr::Ref(a), Expr::add(Expr::Ref(level), Expr::Ref(constant))),
            )
            .unwrap();
        model.set_formula(a, Expr::Ref(constant)).unwrap();
        model.set_formula(rate, Expr::Ref(b)).unwrap();

        let deps = auxiliary_dependencies(&model);
        assert_eq!(2, deps.len());
        assert!(deps[&a].is_empty());
        // only the auxiliary reference survives the filter
        assert_eq!(1, deps[&b].len());
        assert!(deps[&b].contains(&a));
    }

    #[test]
    fn test_validate_and_freeze_is_one_way() {
        let (mut model, ..) = valid_model();
        assert_eq!(Ok(()), model.validate_and_freeze());
        assert!(!model.is_changeable());
        // freezing twice is harmless; the model stays frozen
        assert_eq!(Ok(()), model.validate_and_freeze());
        assert!(!model.is_changeable());
    }

    #[test]
    fn test_failed_validation_leaves_model_changeable() {
        let mut model = Model::new();
        model.create_rate_node("r").unwrap();
        let level = model.create_level_node("stock", 1.0).unwrap();
        assert!(model.validate_and_freeze().is_err());
        assert!(model.is_changeable());
        // still mutable after the failure
        model.set_start_value(level, 2.0).unwrap();
    }
}
