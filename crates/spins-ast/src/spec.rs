//! Process automata and the specification they belong to.

use crate::action::Action;
use crate::expr::Expr;
use crate::span::Span;
use crate::types::{ProcId, StateId, VarId, Variable};
use serde::{Deserialize, Serialize};

/// A control state of a process automaton.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Source labels attached to this state.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Inside an `atomic` block: the process keeps control while it can.
    #[serde(default)]
    pub atomic: bool,
}

impl State {
    fn has_label_prefix(&self, prefix: &str) -> bool {
        self.labels.iter().any(|l| l.starts_with(prefix))
    }

    pub fn is_accept(&self) -> bool {
        self.has_label_prefix("accept")
    }

    pub fn is_end(&self) -> bool {
        self.has_label_prefix("end")
    }

    pub fn is_progress(&self) -> bool {
        self.has_label_prefix("progress")
    }
}

/// An edge of a process automaton: a guarded action sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: StateId,
    /// Target state; `None` terminates the process.
    pub to: Option<StateId>,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub span: Span,
}

impl Transition {
    /// An `else` edge: enabled only when no sibling edge is.
    pub fn is_else(&self) -> bool {
        matches!(self.actions.first(), Some(Action::Else { .. }))
    }

    pub fn first_action(&self) -> Option<&Action> {
        self.actions.first()
    }
}

/// The control-flow automaton of one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Automaton {
    #[serde(default = "start_state")]
    pub start: StateId,
    pub states: Vec<State>,
    pub transitions: Vec<Transition>,
}

fn start_state() -> StateId {
    StateId(0)
}

impl Default for Automaton {
    fn default() -> Self {
        Self {
            start: StateId(0),
            states: vec![State::default()],
            transitions: Vec::new(),
        }
    }
}

impl Automaton {
    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0)
    }

    /// Outgoing edges of `state` with their indices, in declaration order.
    pub fn outgoing(&self, state: StateId) -> impl Iterator<Item = (usize, &Transition)> {
        self.transitions
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.from == state)
    }

    /// States carrying the label `name`.
    pub fn labelled(&self, name: &str) -> impl Iterator<Item = StateId> + '_ {
        let name = name.to_string();
        self.states
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.labels.iter().any(|l| *l == name))
            .map(|(i, _)| StateId(i))
    }

    pub fn has_atomic_states(&self) -> bool {
        self.states.iter().any(|s| s.atomic)
    }
}

/// One process instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Instance name, unique in the specification.
    pub name: String,
    /// The `proctype` this instance was created from.
    pub proctype: String,
    /// Started at system initialisation (`active proctype`) rather than by `run`.
    #[serde(default = "default_active")]
    pub active: bool,
    /// `provided (e)` clause.
    #[serde(default)]
    pub enabler: Option<Expr>,
    /// Formal parameters, in order.
    #[serde(default)]
    pub params: Vec<VarId>,
    #[serde(default)]
    pub locals: Vec<VarId>,
    pub automaton: Automaton,
    #[serde(default)]
    pub span: Span,
}

fn default_active() -> bool {
    true
}

/// A named expression exported as a state label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub expr: Expr,
}

/// A parsed Promela specification: every variable, every process instance
/// and the optional never claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    /// All variables; `VarId` indexes this table.
    pub variables: Vec<Variable>,
    /// Global variables in declaration order.
    #[serde(default)]
    pub globals: Vec<VarId>,
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub never: Option<Process>,
    /// `mtype` constant names; the constant `name` has value index + 1.
    #[serde(default)]
    pub mtypes: Vec<String>,
    #[serde(default)]
    pub exports: Vec<Export>,
    /// User supplied progress condition, replacing progress labels.
    #[serde(default)]
    pub progress: Option<Expr>,
}

impl Specification {
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn process(&self, id: ProcId) -> Option<&Process> {
        self.processes.get(id.0)
    }

    pub fn find_process(&self, name: &str) -> Option<ProcId> {
        self.processes
            .iter()
            .position(|p| p.name == name)
            .map(ProcId)
    }

    /// Instances of `proctype`, in instantiation order.
    pub fn instances_of<'a>(&'a self, proctype: &'a str) -> impl Iterator<Item = ProcId> + 'a {
        self.processes
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.proctype == proctype)
            .map(|(i, _)| ProcId(i))
    }

    /// The process automata followed by the never claim, if any.
    pub fn automata(&self) -> impl Iterator<Item = &Automaton> {
        self.processes
            .iter()
            .chain(self.never.iter())
            .map(|p| &p.automaton)
    }

    pub fn mtype_value(&self, name: &str) -> Option<i32> {
        self.mtypes
            .iter()
            .position(|m| m == name)
            .map(|i| i as i32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_prefixes() {
        let s = State {
            labels: vec!["accept_all".into(), "end0".into()],
            atomic: false,
        };
        assert!(s.is_accept());
        assert!(s.is_end());
        assert!(!s.is_progress());
    }

    #[test]
    fn test_outgoing_keeps_order() {
        let mut a = Automaton::default();
        a.states.push(State::default());
        for to in [Some(StateId(1)), None, Some(StateId(0))] {
            a.transitions.push(Transition {
                from: StateId(0),
                to,
                actions: vec![Action::skip()],
                span: Span::dummy(),
            });
        }
        let targets: Vec<_> = a.outgoing(StateId(0)).map(|(_, t)| t.to).collect();
        assert_eq!(targets, vec![Some(StateId(1)), None, Some(StateId(0))]);
        assert_eq!(a.outgoing(StateId(1)).count(), 0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{
            "variables": [{"name": "x", "ty": {"kind": "Scalar", "scalar": "Int"}}],
            "processes": [{
                "name": "p", "proctype": "P",
                "automaton": {"states": [{}], "transitions": []}
            }]
        }"#;
        let spec: Specification = serde_json::from_str(json).unwrap();
        assert!(spec.processes[0].active);
        assert_eq!(spec.processes[0].automaton.start, StateId(0));
        assert!(spec.never.is_none());
    }
}
