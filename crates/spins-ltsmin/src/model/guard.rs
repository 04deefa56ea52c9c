//! Guard trees.

use spins_ast::{Expr, LogicOp};

/// A boolean condition over the state vector, kept as a tree so that the
/// emitter can short-circuit and the label table can share sub-guards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Guard {
    Expr(Expr),
    /// All hold; empty is true.
    And(Vec<Guard>),
    /// Any holds; empty is false.
    Or(Vec<Guard>),
    /// Not all hold; empty is false.
    Nand(Vec<Guard>),
}

impl Guard {
    pub fn expr(e: Expr) -> Self {
        Guard::Expr(e)
    }

    /// The guard as a single expression, the form labels are keyed by.
    pub fn to_expr(&self) -> Expr {
        match self {
            Guard::Expr(e) => e.clone(),
            Guard::And(gs) => Expr::conjunction(gs.iter().map(Guard::to_expr)),
            Guard::Or(gs) => Expr::disjunction(gs.iter().map(Guard::to_expr)),
            Guard::Nand(gs) => Expr::not(Expr::conjunction(gs.iter().map(Guard::to_expr))),
        }
    }

    /// Truth value when it does not depend on the state.
    pub fn constant_value(&self) -> Option<bool> {
        match self {
            Guard::Expr(e) => e.constant_value().map(|v| v != 0),
            Guard::And(gs) => fold(gs, false),
            Guard::Or(gs) => fold(gs, true),
            Guard::Nand(gs) => fold(gs, false).map(|v| !v),
        }
    }

    pub fn is_true(&self) -> bool {
        self.constant_value() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.constant_value() == Some(false)
    }

    /// Pre-order visit of the expressions in this tree.
    pub fn visit_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Guard::Expr(e) => e.visit(f),
            Guard::And(gs) | Guard::Or(gs) | Guard::Nand(gs) => {
                gs.iter().for_each(|g| g.visit_exprs(f))
            }
        }
    }

    pub fn contains_timeout(&self) -> bool {
        let mut found = false;
        self.visit_exprs(&mut |e| found |= matches!(e, Expr::Timeout));
        found
    }
}

/// Fold a conjunction (`absorbing == false`) or disjunction
/// (`absorbing == true`) of constant guards. A member equal to `absorbing`
/// decides the result even when others are not constant.
fn fold(gs: &[Guard], absorbing: bool) -> Option<bool> {
    let mut all_constant = true;
    for g in gs {
        match g.constant_value() {
            Some(v) if v == absorbing => return Some(absorbing),
            Some(_) => {}
            None => all_constant = false,
        }
    }
    all_constant.then_some(!absorbing)
}

impl From<Expr> for Guard {
    fn from(e: Expr) -> Self {
        Guard::Expr(e)
    }
}

/// Split a guard expression into conjunctive clauses. Disjunctions over
/// conjunctions are distributed while the clause count stays within
/// `limit`; beyond that the disjunction is kept whole.
pub fn cnf_clauses(expr: &Expr, limit: usize) -> Vec<Expr> {
    match expr {
        Expr::Logic {
            op: LogicOp::And,
            left,
            right,
        } => {
            let mut clauses = cnf_clauses(left, limit);
            clauses.extend(cnf_clauses(right, limit));
            clauses
        }
        Expr::Logic {
            op: LogicOp::Or,
            left,
            right,
        } => {
            let l = cnf_clauses(left, limit);
            let r = cnf_clauses(right, limit);
            if l.len() * r.len() > limit || (l.len() == 1 && r.len() == 1) {
                return vec![expr.clone()];
            }
            let mut clauses = Vec::with_capacity(l.len() * r.len());
            for a in &l {
                for b in &r {
                    clauses.push(Expr::or(a.clone(), b.clone()));
                }
            }
            clauses
        }
        _ => vec![expr.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spins_ast::VarId;

    fn x() -> Expr {
        Expr::var(VarId(0))
    }

    #[test]
    fn test_empty_guards() {
        assert!(Guard::And(vec![]).is_true());
        assert!(Guard::Or(vec![]).is_false());
        assert!(Guard::Nand(vec![]).is_false());
    }

    #[test]
    fn test_absorbing_member_decides() {
        let g = Guard::And(vec![Guard::expr(x()), Guard::expr(Expr::bool(false))]);
        assert!(g.is_false());
        let g = Guard::Or(vec![Guard::expr(x()), Guard::expr(Expr::bool(true))]);
        assert!(g.is_true());
        let g = Guard::Nand(vec![Guard::expr(x()), Guard::expr(Expr::bool(false))]);
        assert!(g.is_true());
        assert_eq!(Guard::And(vec![Guard::expr(x())]).constant_value(), None);
    }

    #[test]
    fn test_nand_to_expr() {
        let g = Guard::Nand(vec![Guard::expr(x())]);
        assert_eq!(g.to_expr(), Expr::not(x()));
    }

    #[test]
    fn test_cnf_distributes_within_limit() {
        let a = Expr::lt(x(), Expr::constant(1));
        let b = Expr::gt(x(), Expr::constant(5));
        let c = Expr::eq(Expr::var(VarId(1)), Expr::constant(0));
        let e = Expr::or(Expr::and(a.clone(), b.clone()), c.clone());
        let clauses = cnf_clauses(&e, 16);
        assert_eq!(
            clauses,
            vec![Expr::or(a.clone(), c.clone()), Expr::or(b.clone(), c.clone())]
        );
        assert_eq!(cnf_clauses(&e, 1), vec![e]);
    }
}
