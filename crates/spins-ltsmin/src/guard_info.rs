//! The label table and the guard matrices computed over it.
//!
//! Guard labels come first: every distinct guard expression of every group
//! gets one index, shared by all groups using it. The named state labels
//! follow and may repeat a guard expression under their own index.

use crate::matrix::DepMatrix;
use crate::model::guard::cnf_clauses;
use crate::model::transition::Transition;
use crate::state::StateVector;
use indexmap::IndexMap;
use spins_ast::{pretty_print_expr, Expr, ProcId, Specification, StateId, Variable};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Clause budget when splitting guards into CNF.
const CNF_LIMIT: usize = 16;

pub const ACCEPT_LABEL: &str = "accept_";
pub const PROGRESS_LABEL: &str = "progress_";
pub const NON_PROGRESS_LABEL: &str = "np_";
pub const VALID_END_LABEL: &str = "end_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Guard,
    Accept,
    Progress,
    NonProgress,
    ValidEnd,
    Export,
    /// A statement label of some automaton state.
    State,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub expr: Expr,
    pub kind: LabelKind,
}

#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    guard_count: usize,
    trans_labels: Vec<Vec<usize>>,
    index: HashMap<Expr, usize>,
}

impl LabelTable {
    pub(crate) fn build(
        spec: &Specification,
        variables: &[Variable],
        sv: &StateVector,
        transitions: &[Transition],
        never_accepting: &BTreeSet<StateId>,
        cnf: bool,
    ) -> Self {
        let mut table = LabelTable::default();
        for t in transitions {
            let mut own = Vec::with_capacity(t.guards.len());
            for g in &t.guards {
                let expr = g.to_expr();
                let parts = if cnf { cnf_clauses(&expr, CNF_LIMIT) } else { vec![expr] };
                for part in parts {
                    let l = table.guard(part, variables);
                    if !own.contains(&l) {
                        own.push(l);
                    }
                }
            }
            table.trans_labels.push(own);
        }
        table.guard_count = table.labels.len();

        if let (Some(never), Some(pc)) = (&spec.never, sv.never_pc()) {
            let at = |s: usize| Expr::eq(Expr::var(pc), Expr::constant(s as i32));
            let mut accepting: Vec<Expr> = never
                .automaton
                .states
                .iter()
                .enumerate()
                .filter(|(i, s)| s.is_accept() || never_accepting.contains(&StateId(*i)))
                .map(|(i, _)| at(i))
                .collect();
            if never.automaton.state(never.automaton.start).is_some_and(|s| s.is_accept()) {
                accepting.push(Expr::eq(Expr::var(pc), Expr::constant(-1)));
            }
            table.named(ACCEPT_LABEL, Expr::disjunction(accepting), LabelKind::Accept);
        }

        let progress = match &spec.progress {
            Some(e) => e.clone(),
            None => Expr::disjunction(state_predicates(spec, sv, |s| s.is_progress())),
        };
        table.named(NON_PROGRESS_LABEL, Expr::not(progress.clone()), LabelKind::NonProgress);
        table.named(PROGRESS_LABEL, progress, LabelKind::Progress);
        table.named(VALID_END_LABEL, valid_end(spec, sv), LabelKind::ValidEnd);

        for export in &spec.exports {
            table.named(&export.name, export.expr.clone(), LabelKind::Export);
        }

        let mut by_name: IndexMap<&str, Expr> = IndexMap::new();
        for (p, process) in spec.processes.iter().enumerate() {
            for (s, state) in process.automaton.states.iter().enumerate() {
                for name in &state.labels {
                    let here = pc_is(sv, ProcId(p), s as i32);
                    match by_name.get_mut(name.as_str()) {
                        Some(prev) => {
                            let earlier = std::mem::replace(prev, Expr::bool(false));
                            *prev = Expr::or(earlier, here);
                        }
                        None => {
                            by_name.insert(name.as_str(), here);
                        }
                    }
                }
            }
        }
        for (name, expr) in by_name {
            table.named(name, expr, LabelKind::State);
        }

        debug!(
            guards = table.guard_count,
            labels = table.labels.len(),
            "label table built"
        );
        table
    }

    /// Index of a guard label, registering it on first sight.
    fn guard(&mut self, expr: Expr, variables: &[Variable]) -> usize {
        if let Some(&l) = self.index.get(&expr) {
            return l;
        }
        let l = self.labels.len();
        self.labels.push(Label {
            name: pretty_print_expr(&expr, variables),
            expr: expr.clone(),
            kind: LabelKind::Guard,
        });
        self.index.insert(expr, l);
        l
    }

    fn named(&mut self, name: &str, expr: Expr, kind: LabelKind) {
        self.labels.push(Label {
            name: name.to_string(),
            expr,
            kind,
        });
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn label(&self, l: usize) -> &Label {
        &self.labels[l]
    }

    /// Number of guard labels; they occupy indices `0..guard_count`.
    pub fn guard_count(&self) -> usize {
        self.guard_count
    }

    pub fn is_guard(&self, l: usize) -> bool {
        l < self.guard_count
    }

    /// The guard labels of group `t`, in guard order.
    pub fn guards_of(&self, t: usize) -> &[usize] {
        self.trans_labels.get(t).map_or(&[], Vec::as_slice)
    }

    /// Index of the guard label for `expr`.
    pub fn guard_index(&self, expr: &Expr) -> Option<usize> {
        self.index.get(expr).copied()
    }

    /// First label called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.name == name)
    }
}

fn pc_is(sv: &StateVector, p: ProcId, s: i32) -> Expr {
    Expr::eq(Expr::var(sv.pc(p)), Expr::constant(s))
}

fn state_predicates(
    spec: &Specification,
    sv: &StateVector,
    pick: impl Fn(&spins_ast::State) -> bool,
) -> Vec<Expr> {
    let mut out = Vec::new();
    for (p, process) in spec.processes.iter().enumerate() {
        for (s, state) in process.automaton.states.iter().enumerate() {
            if pick(state) {
                out.push(pc_is(sv, ProcId(p), s as i32));
            }
        }
    }
    out
}

/// Every process is dead or parked in an `end` labelled state.
fn valid_end(spec: &Specification, sv: &StateVector) -> Expr {
    let parked = spec.processes.iter().enumerate().map(|(p, process)| {
        let p = ProcId(p);
        let ends = process
            .automaton
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_end())
            .map(|(s, _)| pc_is(sv, p, s as i32));
        Expr::disjunction(std::iter::once(pc_is(sv, p, -1)).chain(ends))
    });
    Expr::conjunction(parked)
}

/// Labels plus the guard relations used for partial order reduction.
///
/// All relations over-approximate: a cleared bit is a proven fact, a set
/// bit may or may not hold.
#[derive(Debug, Clone)]
pub struct GuardInfo {
    pub labels: LabelTable,
    /// Labels that may hold in the same state (labels x labels).
    pub co_enabled: DepMatrix,
    /// Labels that may fail in the same state (labels x labels).
    pub co_disabled: DepMatrix,
    /// Groups that may make a false label true (labels x groups).
    pub nes: DepMatrix,
    /// Groups that may make a true label false (labels x groups).
    pub nds: DepMatrix,
    /// Groups that may change a label (labels x groups).
    pub visibility: DepMatrix,
    /// Derived matrices by name.
    pub extra: IndexMap<String, DepMatrix>,
}

impl GuardInfo {
    /// Every relation fully set.
    pub fn conservative(labels: LabelTable, groups: usize) -> Self {
        let n = labels.len();
        Self {
            labels,
            co_enabled: DepMatrix::full(n, n),
            co_disabled: DepMatrix::full(n, n),
            nes: DepMatrix::full(n, groups),
            nds: DepMatrix::full(n, groups),
            visibility: DepMatrix::full(n, groups),
            extra: IndexMap::new(),
        }
    }

    pub fn matrix(&self, name: &str) -> Option<&DepMatrix> {
        self.extra.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_transitions;
    use crate::options::Options;
    use spins_ast::{Action, Identifier, SpecBuilder, VarType};

    fn table(spec: &Specification, cnf: bool) -> (LabelTable, Vec<Transition>) {
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(spec, &mut vars).unwrap();
        let built = build_transitions(spec, &vars, &sv, &Options::default()).unwrap();
        let t = LabelTable::build(spec, &vars, &sv, &built.transitions, &built.never_accepting, cnf);
        (t, built.transitions)
    }

    #[test]
    fn test_identical_guards_share_a_label() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        for name in ["A", "B"] {
            b.process(name, |p| {
                p.sequence(vec![Action::expr(Expr::lt(Expr::var(x), Expr::constant(3)))]);
            });
        }
        let (labels, transitions) = table(&b.build(), false);
        let guard = labels.guard_index(&Expr::lt(Expr::var(x), Expr::constant(3))).unwrap();
        let users: Vec<_> = transitions
            .iter()
            .filter(|t| labels.guards_of(t.group).contains(&guard))
            .collect();
        assert_eq!(users.len(), 2);
        assert!(labels.is_guard(guard));
        assert!(labels.find(VALID_END_LABEL).unwrap() >= labels.guard_count());
    }

    #[test]
    fn test_state_labels_merge_by_name() {
        let mut b = SpecBuilder::new();
        for name in ["A", "B"] {
            b.process(name, |p| {
                let s = p.start();
                p.label(s, "ready");
            });
        }
        let spec = b.build();
        let (labels, _) = table(&spec, false);
        let ready = labels.find("ready").unwrap();
        assert_eq!(labels.label(ready).kind, LabelKind::State);
        assert!(matches!(labels.label(ready).expr, Expr::Logic { .. }));
        assert_eq!(labels.labels().iter().filter(|l| l.name == "ready").count(), 1);
    }

    #[test]
    fn test_cnf_splits_guard_labels() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        let y = b.global(Variable::new("y", VarType::int()));
        let guard = Expr::or(
            Expr::and(Expr::lt(Expr::var(x), Expr::constant(1)), Expr::gt(Expr::var(x), Expr::constant(5))),
            Expr::eq(Expr::var(y), Expr::constant(0)),
        );
        b.process("A", |p| {
            p.sequence(vec![
                Action::expr(guard.clone()),
                Action::assign(Identifier::new(y), Expr::constant(1)),
            ]);
        });
        let spec = b.build();
        let (plain, _) = table(&spec, false);
        let (split, _) = table(&spec, true);
        assert_eq!(split.guard_count(), plain.guard_count() + 1);
    }
}
