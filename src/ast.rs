// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::NodeId;

// we use Boxs here because formulas are walked and copied a number of
// times, and we want to avoid reallocating subexpressions all over
// the place.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    /// A leaf: a reference to a level, constant, or auxiliary node.
    /// The referenced entity is shared, never duplicated -- copying a
    /// formula copies operator nodes only.
    Ref(NodeId),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Mul,
    Max,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    // e.g. Mul.precedence() > Add.precedence()
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add => 4,
            BinaryOp::Mul => 5,
            // rendered function-call style; never ambiguous
            BinaryOp::Max => 6,
        }
    }
}

impl Expr {
    pub fn add(l: Expr, r: Expr) -> Expr {
        Expr::Op2(BinaryOp::Add, Box::new(l), Box::new(r))
    }

    pub fn mul(l: Expr, r: Expr) -> Expr {
        Expr::Op2(BinaryOp::Mul, Box::new(l), Box::new(r))
    }

    pub fn max(l: Expr, r: Expr) -> Expr {
        Expr::Op2(BinaryOp::Max, Box::new(l), Box::new(r))
    }

    /// Evaluates the expression against the given node-value lookup.
    ///
    /// A leaf reads whatever value was last written into the referenced
    /// entity; evaluation never triggers a recursive recompute of other
    /// nodes.  Pure: the only reads are through `values`.
    pub fn evaluate(&self, values: &impl Fn(NodeId) -> f64) -> f64 {
        match self {
            Expr::Ref(id) => values(*id),
            Expr::Op2(op, l, r) => {
                let l = l.evaluate(values);
                let r = r.evaluate(values);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Max => l.max(r),
                }
            }
        }
    }

    /// The set of all entities referenced by leaves of this subtree,
    /// inclusive.
    pub fn dependencies(&self) -> BTreeSet<NodeId> {
        let mut deps = BTreeSet::new();
        self.add_deps(&mut deps);
        deps
    }

    fn add_deps(&self, deps: &mut BTreeSet<NodeId>) {
        match self {
            Expr::Ref(id) => {
                deps.insert(*id);
            }
            Expr::Op2(_, l, r) => {
                l.add_deps(deps);
                r.add_deps(deps);
            }
        }
    }

    /// Duplicates every operator node of this tree.  Leaves are entity
    /// handles and stay shared: renaming or mutating the referenced node
    /// is visible through both the original and the copy.
    pub fn deep_copy_structure(&self) -> Expr {
        match self {
            Expr::Ref(id) => Expr::Ref(*id),
            Expr::Op2(op, l, r) => Expr::Op2(
                *op,
                Box::new(l.deep_copy_structure()),
                Box::new(r.deep_copy_structure()),
            ),
        }
    }

    /// Returns a fresh, finite preorder traversal of this tree's subtrees
    /// (the tree itself first).  The sequence is produced over a snapshot
    /// taken at call time; later mutation of the original does not show
    /// through, and each call starts over from a new snapshot.
    pub fn iter_preorder(&self) -> impl Iterator<Item = Expr> {
        let mut subtrees = Vec::new();
        fn walk(e: &Expr, out: &mut Vec<Expr>) {
            out.push(e.deep_copy_structure());
            if let Expr::Op2(_, l, r) = e {
                walk(l, out);
                walk(r, out);
            }
        }
        walk(self, &mut subtrees);
        subtrees.into_iter()
    }
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum RenderStyle {
    /// Node display names, every binary operation wrapped in parentheses.
    Parenthesized,
    /// Node ids instead of names, parentheses only where precedence
    /// requires them.
    Abbreviated,
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

fn child_needs_parens(parent: &Expr, child: &Expr) -> bool {
    match parent {
        // no children so doesn't matter
        Expr::Ref(_) => false,
        // max(l, r) renders comma separated, so no ambiguity possible
        Expr::Op2(BinaryOp::Max, _, _) => false,
        Expr::Op2(parent_op, _, _) => match child {
            Expr::Ref(_) | Expr::Op2(BinaryOp::Max, _, _) => false,
            // if we have `3 * (2 + 3)`, the parent's precedence is
            // higher than the child and we need enclosing parens
            Expr::Op2(child_op, _, _) => parent_op.precedence() > child_op.precedence(),
        },
    }
}

fn paren_if_necessary(parent: &Expr, child: &Expr, eqn: String) -> String {
    if child_needs_parens(parent, child) {
        format!("({eqn})")
    } else {
        eqn
    }
}

struct PrintVisitor<'a> {
    style: RenderStyle,
    names: &'a dyn Fn(NodeId) -> String,
}

impl Visitor<String> for PrintVisitor<'_> {
    fn walk(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Ref(id) => match self.style {
                RenderStyle::Parenthesized => (self.names)(*id),
                RenderStyle::Abbreviated => format!("{id}"),
            },
            Expr::Op2(BinaryOp::Max, l, r) => {
                let l = self.walk(l);
                let r = self.walk(r);
                format!("max({l}, {r})")
            }
            Expr::Op2(op, l, r) => {
                // the fully parenthesized form needs no precedence checks:
                // every operation wraps itself
                let (l, r) = match self.style {
                    RenderStyle::Parenthesized => (self.walk(l), self.walk(r)),
                    RenderStyle::Abbreviated => (
                        paren_if_necessary(expr, l, self.walk(l)),
                        paren_if_necessary(expr, r, self.walk(r)),
                    ),
                };
                let op: &str = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Mul => "*",
                    BinaryOp::Max => unreachable!(),
                };
                match self.style {
                    RenderStyle::Parenthesized => format!("({l} {op} {r})"),
                    RenderStyle::Abbreviated => format!("{l} {op} {r}"),
                }
            }
        }
    }
}

/// Renders a formula as text.  The string form is for humans; it is not
/// guaranteed unique and is never parsed back by the engine.
pub fn print_eqn(expr: &Expr, style: RenderStyle, names: &dyn Fn(NodeId) -> String) -> String {
    let mut visitor = PrintVisitor { style, names };
    visitor.walk(expr)
}
