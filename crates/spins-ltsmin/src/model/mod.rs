//! The finished model handed to an emitter.

pub mod guard;
pub mod transition;

use crate::dm::Dependencies;
use crate::guard_info::{GuardInfo, LabelTable};
use crate::state::StateVector;
use guard::Guard;
use spins_ast::{Expr, Variable};
use transition::Transition;

/// A run-time check the emitter must evaluate on every state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub expr: Expr,
    pub message: String,
}

/// Immutable result of model construction: the state vector layout, the
/// transition groups, the label table with its guard matrices and the
/// dependency matrices.
#[derive(Debug, Clone)]
pub struct Model {
    variables: Vec<Variable>,
    state: StateVector,
    transitions: Vec<Transition>,
    deadlock: Guard,
    guard_info: GuardInfo,
    deps: Dependencies,
    assertions: Vec<Assertion>,
    has_atomic_cycles: bool,
    mtypes: Vec<String>,
}

pub(crate) struct ModelParts {
    pub variables: Vec<Variable>,
    pub state: StateVector,
    pub transitions: Vec<Transition>,
    pub deadlock: Guard,
    pub guard_info: GuardInfo,
    pub deps: Dependencies,
    pub assertions: Vec<Assertion>,
    pub has_atomic_cycles: bool,
    pub mtypes: Vec<String>,
}

impl Model {
    pub(crate) fn new(parts: ModelParts) -> Self {
        Self {
            variables: parts.variables,
            state: parts.state,
            transitions: parts.transitions,
            deadlock: parts.deadlock,
            guard_info: parts.guard_info,
            deps: parts.deps,
            assertions: parts.assertions,
            has_atomic_cycles: parts.has_atomic_cycles,
            mtypes: parts.mtypes,
        }
    }

    /// The variable table, including the synthesized bookkeeping variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transition(&self, group: usize) -> Option<&Transition> {
        self.transitions.get(group)
    }

    pub fn group_count(&self) -> usize {
        self.transitions.len()
    }

    /// Holds when no group without `timeout` is enabled; `timeout`
    /// evaluates to it.
    pub fn deadlock(&self) -> &Guard {
        &self.deadlock
    }

    pub fn guard_info(&self) -> &GuardInfo {
        &self.guard_info
    }

    pub fn labels(&self) -> &LabelTable {
        &self.guard_info.labels
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    pub fn has_atomic_cycles(&self) -> bool {
        self.has_atomic_cycles
    }

    pub fn mtypes(&self) -> &[String] {
        &self.mtypes
    }

    pub fn initial_state(&self) -> Vec<i32> {
        self.state.initial_state()
    }
}
