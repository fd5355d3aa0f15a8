// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use crate::common::{NodeId, Result};
use crate::model::Model;
use crate::node::Node;
use crate::results::Results;
use crate::sim_err;
use crate::validate::auxiliary_dependencies;

// A rate or auxiliary reaching step() without a formula would mean
// validation was bypassed; rule 3 makes the NoFormula returns below
// unreachable in a frozen model.

impl Model {
    /// Advances the simulation by one discrete Euler step: auxiliaries in
    /// dependency order, then rates, then levels.  Requires a frozen model.
    pub fn step(&mut self) -> Result<()> {
        if self.is_changeable() {
            return sim_err!(StillChangeable);
        }

        // auxiliaries, in an order where every auxiliary predecessor has
        // already been evaluated this step
        let order = auxiliary_order(&auxiliary_dependencies(self))?;
        let mut computed: BTreeMap<NodeId, f64> = BTreeMap::new();
        for id in order {
            let value = match &self.nodes[&id] {
                Node::Auxiliary {
                    formula: Some(formula),
                    ..
                } => formula.evaluate(&|dep| self.stale_value(dep, &computed)),
                _ => return sim_err!(NoFormula, format!("{id}")),
            };
            computed.insert(id, value);
        }
        for (id, value) in computed {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_value(value);
            }
        }

        // rates; order independent, formulas reference only levels,
        // constants, and (now fresh) auxiliaries
        let mut rates: Vec<(NodeId, f64)> = Vec::new();
        for id in self.rate_nodes() {
            let value = match &self.nodes[&id] {
                Node::Rate {
                    formula: Some(formula),
                    ..
                } => formula.evaluate(&|dep| self.cached_value(dep)),
                _ => return sim_err!(NoFormula, format!("{id}")),
            };
            rates.push((id, value));
        }
        for (id, value) in rates {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_value(value);
            }
        }

        // levels; each reads only rate values computed above
        let mut levels: Vec<(NodeId, f64)> = Vec::new();
        for id in self.level_nodes() {
            if let Node::Level {
                value,
                inflows,
                outflows,
                ..
            } = &self.nodes[&id]
            {
                let inflow: f64 = inflows.iter().map(|r| self.cached_value(*r)).sum();
                let outflow: f64 = outflows.iter().map(|r| self.cached_value(*r)).sum();
                levels.push((id, value + inflow - outflow));
            }
        }
        for (id, value) in levels {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_value(value);
            }
        }

        Ok(())
    }

    /// Runs `steps` simulation steps on a frozen model, recording every
    /// named node's value at each step (including the starting state) into
    /// a [`Results`] for export collaborators.
    pub fn run(&mut self, steps: usize) -> Result<Results> {
        if self.is_changeable() {
            return sim_err!(StillChangeable);
        }

        let columns: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.name().is_some())
            .map(|(id, _)| *id)
            .collect();

        let mut offsets: HashMap<String, usize> = HashMap::new();
        offsets.insert("time".to_string(), 0);
        for (i, id) in columns.iter().enumerate() {
            offsets.insert(self.display_name(*id), i + 1);
        }

        let step_size = columns.len() + 1;
        let mut data: Vec<f64> = Vec::with_capacity((steps + 1) * step_size);
        for time in 0..=steps {
            if time > 0 {
                self.step()?;
            }
            data.push(time as f64);
            for id in columns.iter() {
                data.push(self.cached_value(*id));
            }
        }

        Ok(Results {
            offsets,
            data: data.into_boxed_slice(),
            step_size,
            step_count: steps + 1,
        })
    }

    fn cached_value(&self, id: NodeId) -> f64 {
        self.nodes.get(&id).and_then(Node::value).unwrap_or(0.0)
    }

    fn stale_value(&self, id: NodeId, computed: &BTreeMap<NodeId, f64>) -> f64 {
        computed
            .get(&id)
            .copied()
            .unwrap_or_else(|| self.cached_value(id))
    }
}

// Kahn's algorithm over the auxiliary precedence graph.  Ties between
// simultaneously eligible auxiliaries break toward the lowest id
// (creation order), for reproducible traces.
fn auxiliary_order(deps: &BTreeMap<NodeId, BTreeSet<NodeId>>) -> Result<Vec<NodeId>> {
    let mut remaining: BTreeMap<NodeId, usize> =
        deps.iter().map(|(id, d)| (*id, d.len())).collect();
    let mut dependents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (id, d) in deps.iter() {
        for dep in d.iter() {
            dependents.entry(*dep).or_default().push(*id);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order: Vec<NodeId> = Vec::with_capacity(deps.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for dependent in dependents.get(&id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push(Reverse(*dependent));
                }
            }
        }
    }

    if order.len() != deps.len() {
        // a cycle here means validation was bypassed
        return sim_err!(Generic, "auxiliary precedence graph has a cycle".to_string());
    }
    Ok(order)
}
