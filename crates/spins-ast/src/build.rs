//! Construct specifications by hand.
//!
//! Frontends normally hand over a deserialized [`Specification`]; the
//! builders here are for tests, benchmarks and small generated models.
//!
//! ```
//! use spins_ast::{Action, Expr, Identifier, SpecBuilder, VarType, Variable};
//!
//! let mut b = SpecBuilder::new();
//! let x = b.global(Variable::new("x", VarType::int()));
//! b.process("A", |p| {
//!     p.sequence(vec![
//!         Action::assign(Identifier::new(x), Expr::constant(1)),
//!         Action::assign(Identifier::new(x), Expr::constant(2)),
//!     ]);
//! });
//! let spec = b.build();
//! assert_eq!(spec.processes[0].automaton.states.len(), 3);
//! ```

use crate::action::Action;
use crate::expr::Expr;
use crate::span::Span;
use crate::spec::{Automaton, Export, Process, State, Specification, Transition};
use crate::types::{ProcId, StateId, VarId, Variable};

/// Builds a [`Specification`].
#[derive(Debug, Default)]
pub struct SpecBuilder {
    spec: Specification,
}

impl SpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global variable.
    pub fn global(&mut self, var: Variable) -> VarId {
        let id = VarId(self.spec.variables.len());
        self.spec.variables.push(Variable { owner: None, ..var });
        self.spec.globals.push(id);
        id
    }

    /// Declare an `mtype` constant and return it as an expression.
    pub fn mtype(&mut self, name: impl Into<String>) -> Expr {
        let name = name.into();
        let value = match self.spec.mtype_value(&name) {
            Some(v) => v,
            None => {
                self.spec.mtypes.push(name.clone());
                self.spec.mtypes.len() as i32
            }
        };
        Expr::Mtype { name, value }
    }

    /// Add an active process instance whose proctype shares its name.
    pub fn process(&mut self, name: &str, f: impl FnOnce(&mut ProcessBuilder<'_>)) -> ProcId {
        self.instance(name, name, true, f)
    }

    /// Add a process instance of `proctype`.
    pub fn instance(
        &mut self,
        name: &str,
        proctype: &str,
        active: bool,
        f: impl FnOnce(&mut ProcessBuilder<'_>),
    ) -> ProcId {
        let id = ProcId(self.spec.processes.len());
        let process = self.build_process(Some(id), name, proctype, active, f);
        self.spec.processes.push(process);
        id
    }

    /// Set the never claim.
    pub fn never(&mut self, f: impl FnOnce(&mut ProcessBuilder<'_>)) {
        let process = self.build_process(None, "never", "never", true, f);
        self.spec.never = Some(process);
    }

    pub fn export(&mut self, name: impl Into<String>, expr: Expr) {
        self.spec.exports.push(Export {
            name: name.into(),
            expr,
        });
    }

    pub fn progress(&mut self, expr: Expr) {
        self.spec.progress = Some(expr);
    }

    pub fn build(self) -> Specification {
        self.spec
    }

    fn build_process(
        &mut self,
        id: Option<ProcId>,
        name: &str,
        proctype: &str,
        active: bool,
        f: impl FnOnce(&mut ProcessBuilder<'_>),
    ) -> Process {
        let mut builder = ProcessBuilder {
            id,
            variables: &mut self.spec.variables,
            process: Process {
                name: name.to_string(),
                proctype: proctype.to_string(),
                active,
                enabler: None,
                params: Vec::new(),
                locals: Vec::new(),
                automaton: Automaton::default(),
                span: Span::dummy(),
            },
        };
        f(&mut builder);
        builder.process
    }
}

/// Builds one process automaton. State 0 exists from the start and is the
/// initial state.
#[derive(Debug)]
pub struct ProcessBuilder<'a> {
    id: Option<ProcId>,
    variables: &'a mut Vec<Variable>,
    process: Process,
}

impl ProcessBuilder<'_> {
    /// The instance being built; `None` for the never claim.
    pub fn id(&self) -> Option<ProcId> {
        self.id
    }

    pub fn start(&self) -> StateId {
        self.process.automaton.start
    }

    fn declare(&mut self, var: Variable) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(Variable {
            owner: self.id,
            ..var
        });
        id
    }

    /// Declare a local variable of this instance.
    pub fn local(&mut self, var: Variable) -> VarId {
        let id = self.declare(var);
        self.process.locals.push(id);
        id
    }

    /// Declare a formal parameter of this instance.
    pub fn param(&mut self, var: Variable) -> VarId {
        let id = self.declare(var);
        self.process.params.push(id);
        id
    }

    pub fn inactive(&mut self) -> &mut Self {
        self.process.active = false;
        self
    }

    pub fn enabler(&mut self, expr: Expr) -> &mut Self {
        self.process.enabler = Some(expr);
        self
    }

    pub fn at(&mut self, span: Span) -> &mut Self {
        self.process.span = span;
        self
    }

    /// Add a fresh state.
    pub fn state(&mut self) -> StateId {
        self.process.automaton.states.push(State::default());
        StateId(self.process.automaton.states.len() - 1)
    }

    /// Add a fresh state inside an atomic block.
    pub fn atomic_state(&mut self) -> StateId {
        let s = self.state();
        self.set_atomic(s);
        s
    }

    pub fn set_atomic(&mut self, state: StateId) {
        if let Some(s) = self.process.automaton.states.get_mut(state.0) {
            s.atomic = true;
        }
    }

    pub fn label(&mut self, state: StateId, name: impl Into<String>) {
        if let Some(s) = self.process.automaton.states.get_mut(state.0) {
            s.labels.push(name.into());
        }
    }

    /// Add an edge; `to == None` terminates the process.
    pub fn edge(&mut self, from: StateId, to: Option<StateId>, actions: Vec<Action>) -> usize {
        let span = actions
            .iter()
            .map(Action::span)
            .fold(Span::dummy(), Span::first);
        self.process.automaton.transitions.push(Transition {
            from,
            to,
            actions,
            span,
        });
        self.process.automaton.transitions.len() - 1
    }

    /// Chain one single-action edge per action from the start state and
    /// return all states in order. The last state has no outgoing edge.
    pub fn sequence(&mut self, actions: Vec<Action>) -> Vec<StateId> {
        let mut states = vec![self.start()];
        for action in actions {
            let from = states[states.len() - 1];
            let to = self.state();
            self.edge(from, Some(to), vec![action]);
            states.push(to);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarType;

    #[test]
    fn test_locals_are_owned() {
        let mut b = SpecBuilder::new();
        let g = b.global(Variable::new("g", VarType::int()));
        let mut local = None;
        let p = b.process("P", |p| {
            local = Some(p.local(Variable::new("l", VarType::byte())));
        });
        let spec = b.build();
        assert_eq!(spec.variables[g.0].owner, None);
        let l = local.unwrap();
        assert_eq!(spec.variables[l.0].owner, Some(p));
        assert_eq!(spec.processes[p.0].locals, vec![l]);
    }

    #[test]
    fn test_mtype_values_are_stable() {
        let mut b = SpecBuilder::new();
        let a = b.mtype("ack");
        let n = b.mtype("nak");
        assert_eq!(b.mtype("ack"), a);
        assert_eq!(n.constant_value(), Some(2));
    }

    #[test]
    fn test_never_claim_has_no_owner() {
        let mut b = SpecBuilder::new();
        b.never(|n| {
            let s = n.start();
            n.label(s, "accept_init");
            n.edge(s, Some(s), vec![Action::skip()]);
        });
        let spec = b.build();
        let never = spec.never.unwrap();
        assert!(never.automaton.states[0].is_accept());
        assert_eq!(never.automaton.transitions.len(), 1);
    }
}
