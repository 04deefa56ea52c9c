//! Compiled transition groups.

use super::guard::Guard;
use spins_ast::{Action, ProcId, Span, StateId};

/// A state change performed by a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Effect {
    Action(Action),
    /// Restore the sub-vector of a dying process (pid and locals) to its
    /// initial values. The program counter is set by a separate assignment.
    Reset(ProcId),
}

/// What produced a transition group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// One edge of one process (optionally with a never claim step).
    Plain,
    /// A rendezvous send of `begin.process` matched with a receive of
    /// `receiver` at `receiver_state`.
    Rendezvous {
        receiver: ProcId,
        receiver_state: StateId,
    },
    /// Releases the priority of a process that is blocked inside an atomic
    /// block.
    LossOfAtomicity,
    /// A never claim step taken once the system has deadlocked.
    NeverStep,
}

/// A node of the cross-product automaton: a process location paired with
/// a never claim location. `state == None` is process death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub process: Option<ProcId>,
    pub state: Option<StateId>,
    pub never: Option<StateId>,
}

impl Node {
    pub fn new(process: Option<ProcId>, state: Option<StateId>, never: Option<StateId>) -> Self {
        Self {
            process,
            state,
            never,
        }
    }
}

/// One transition group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Index in `Model::transitions`.
    pub group: usize,
    /// The process taking the step; `None` for never claim steps.
    pub process: Option<ProcId>,
    pub name: String,
    /// Conjunction of guards; each one becomes a label.
    pub guards: Vec<Guard>,
    pub effects: Vec<Effect>,
    pub kind: TransitionKind,
    pub begin: Node,
    pub end: Node,
    /// Starts in an atomic state.
    pub atomic: bool,
    /// Starts in an atomic state and ends outside of it.
    pub leaves_atomic: bool,
    /// A guard refers to `timeout`.
    pub timeout: bool,
    /// Ends in a progress state.
    pub progress: bool,
    /// A never claim step enabled only in deadlock.
    pub buchi: bool,
    /// The never claim has terminated; this is its accepting stutter loop.
    pub accepting_loop: bool,
    /// Groups that may execute next while atomicity is held.
    pub follow_ups: Vec<usize>,
    pub span: Span,
}

impl Transition {
    pub(crate) fn new(kind: TransitionKind, process: Option<ProcId>, begin: Node) -> Self {
        Self {
            group: 0,
            process,
            name: String::new(),
            guards: Vec::new(),
            effects: Vec::new(),
            kind,
            begin,
            end: begin,
            atomic: false,
            leaves_atomic: false,
            timeout: false,
            progress: false,
            buchi: false,
            accepting_loop: false,
            follow_ups: Vec::new(),
            span: Span::dummy(),
        }
    }

    /// Add a guard unless it is constantly true. Conjunctions are split so
    /// that every conjunct becomes a label of its own.
    pub(crate) fn push_guard(&mut self, guard: impl Into<Guard>) {
        match guard.into() {
            Guard::And(gs) => gs.into_iter().for_each(|g| self.push_guard(g)),
            g if g.is_true() => {}
            g => self.guards.push(g),
        }
    }

    /// A guard folds to false: the transition can never fire.
    pub fn is_never_enabled(&self) -> bool {
        self.guards.iter().any(Guard::is_false)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Action(a) => Some(a),
            Effect::Reset(_) => None,
        })
    }

    /// Processes whose location guards this transition: the stepping
    /// process and, for rendezvous, the receiver.
    pub fn participants(&self) -> impl Iterator<Item = (ProcId, StateId)> + '_ {
        let own = match (self.begin.process, self.begin.state) {
            (Some(p), Some(s)) if self.kind != TransitionKind::NeverStep => Some((p, s)),
            _ => None,
        };
        let partner = match self.kind {
            TransitionKind::Rendezvous {
                receiver,
                receiver_state,
            } => Some((receiver, receiver_state)),
            _ => None,
        };
        own.into_iter().chain(partner)
    }
}
