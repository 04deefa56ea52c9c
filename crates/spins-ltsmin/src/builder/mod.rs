//! Cross-product automaton construction.
//!
//! A depth-first walk over (process location, never claim location) pairs
//! turns every automaton edge into a compiled transition group. Rendezvous
//! sends are paired with every matching receive, atomic sequences are
//! stitched with the priority slot, and once the walk is done the loss of
//! atomicity fallbacks, atomic follow-ups, the deadlock condition and the
//! never claim continuation are derived from the finished group list.

mod atomic;
pub(crate) mod bind;
mod deadlock;
mod enabled;
mod rendezvous;

use crate::error::{BuildError, BuildResult};
use crate::model::guard::Guard;
use crate::model::transition::{Effect, Node, Transition, TransitionKind};
use crate::model::Assertion;
use crate::options::Options;
use crate::progress::{Phase, PhaseTimer};
use crate::state::StateVector;
use rendezvous::Sites;
use spins_ast::{
    pretty_print_action, Action, AssignOp, Automaton, BinOp, Expr, Identifier, ProcId, Process, Span,
    Specification, State, StateId, Transition as Edge, Variable,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// The output of the cross-product walk.
#[derive(Debug)]
pub(crate) struct Built {
    pub transitions: Vec<Transition>,
    pub deadlock: Guard,
    pub assertions: Vec<Assertion>,
    pub has_atomic_cycles: bool,
    /// Never claim states reached by a terminating claim edge. They accept
    /// in addition to the `accept` labelled ones.
    pub never_accepting: BTreeSet<StateId>,
}

/// An automaton edge together with its index in the owning automaton.
/// Implicit death edges of states without successors have no index.
#[derive(Debug, Clone)]
pub(crate) struct IndexedEdge {
    pub index: Option<usize>,
    pub edge: Edge,
}

/// What a never claim step contributes to a system transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeverMove {
    /// There is no never claim.
    Absent,
    /// The claim terminated: the transition becomes its accepting self-loop.
    Stutter,
    Goto(StateId),
}

struct Frame {
    node: Node,
    level: i32,
    children: Vec<Node>,
    next: usize,
}

pub(crate) struct Builder<'a> {
    spec: &'a Specification,
    variables: &'a [Variable],
    sv: &'a StateVector,
    options: &'a Options,
    has_atomic: bool,
    sites: Sites,
    transitions: Vec<Transition>,
    visited: HashSet<Node>,
    on_stack: HashMap<Node, i32>,
    atomic_reached: BTreeSet<(ProcId, StateId)>,
    atomic_cycles: bool,
    never_accepting: BTreeSet<StateId>,
}

/// Build every transition group of `spec`.
pub(crate) fn build_transitions(
    spec: &Specification,
    variables: &[Variable],
    sv: &StateVector,
    options: &Options,
) -> BuildResult<Built> {
    let edges: usize = spec.automata().map(|a| a.transitions.len()).sum();
    let timer = PhaseTimer::start(Phase::Transitions, edges, options.progress.as_ref());
    let mut builder = Builder::new(spec, variables, sv, options)?;

    for (i, process) in spec.processes.iter().enumerate() {
        let never_start = spec.never.as_ref().map(|n| n.automaton.start);
        builder.explore(Node::new(Some(ProcId(i)), Some(process.automaton.start), never_start))?;
        timer.advance(process.automaton.transitions.len());
    }

    builder.mark_timeouts();
    builder.loss_of_atomicity()?;
    builder.follow_ups();
    let deadlock = builder.deadlock();
    builder.never_continuation(&deadlock)?;
    let assertions = builder.assertions()?;

    if let Some(never) = &spec.never {
        let accepting = never.automaton.states.iter().any(State::is_accept);
        if !accepting && builder.never_accepting.is_empty() {
            warn!(never = %never.name, "never claim has no accepting states");
        }
    }

    info!(
        groups = builder.transitions.len(),
        atomic_cycles = builder.atomic_cycles,
        "transition groups built"
    );
    timer.finish();
    Ok(Built {
        transitions: builder.transitions,
        deadlock,
        assertions,
        has_atomic_cycles: builder.atomic_cycles,
        never_accepting: builder.never_accepting,
    })
}

impl<'a> Builder<'a> {
    fn new(
        spec: &'a Specification,
        variables: &'a [Variable],
        sv: &'a StateVector,
        options: &'a Options,
    ) -> BuildResult<Self> {
        if let Some(never) = &spec.never {
            if never.automaton.has_atomic_states() {
                return Err(BuildError::unsupported(
                    &never.name,
                    "an atomic sequence inside a never claim",
                    never.span,
                ));
            }
        }
        Ok(Self {
            spec,
            variables,
            sv,
            options,
            has_atomic: spec.processes.iter().any(|p| p.automaton.has_atomic_states()),
            sites: Sites::collect(spec, variables),
            transitions: Vec::new(),
            visited: HashSet::new(),
            on_stack: HashMap::new(),
            atomic_reached: BTreeSet::new(),
            atomic_cycles: false,
            never_accepting: BTreeSet::new(),
        })
    }

    // --- walk ---

    fn explore(&mut self, start: Node) -> BuildResult<()> {
        let level = self.atomic_level(start, -1);
        if !self.enter(start, level) {
            return Ok(());
        }
        let children = self.expand(start)?;
        let mut stack = vec![Frame {
            node: start,
            level,
            children,
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next == frame.children.len() {
                self.on_stack.remove(&frame.node);
                stack.pop();
                continue;
            }
            let child = frame.children[frame.next];
            frame.next += 1;
            let level = self.atomic_level(child, frame.level);
            if self.enter(child, level) {
                let children = self.expand(child)?;
                stack.push(Frame {
                    node: child,
                    level,
                    children,
                    next: 0,
                });
            }
        }
        Ok(())
    }

    /// Negative levels are outside atomic sequences, positive ones inside.
    /// The magnitude grows each time the walk crosses the boundary, so two
    /// stacked nodes share a level only if no boundary lies between them.
    fn atomic_level(&self, node: Node, previous: i32) -> i32 {
        let atomic = match node.process {
            Some(p) => self.is_atomic(p, node.state),
            None => false,
        };
        if atomic == (previous > 0) {
            previous
        } else if previous > 0 {
            -(previous + 1)
        } else {
            -previous + 1
        }
    }

    /// Mark `node` visited. Returns whether it still has to be expanded.
    fn enter(&mut self, node: Node, level: i32) -> bool {
        let dead_claim = self.spec.never.is_some() && node.never.is_none();
        if node.state.is_none() || dead_claim {
            self.visited.insert(node);
            return false;
        }
        if self.visited.contains(&node) {
            if level > 0 && self.on_stack.get(&node) == Some(&level) {
                if !self.atomic_cycles {
                    warn!(
                        process = %self.process_name(node.process),
                        state = node.state.map_or(-1, |s| s.0 as i64),
                        "cycle inside an atomic sequence"
                    );
                }
                self.atomic_cycles = true;
            }
            return false;
        }
        self.visited.insert(node);
        self.on_stack.insert(node, level);
        true
    }

    fn expand(&mut self, node: Node) -> BuildResult<Vec<Node>> {
        let (Some(p), Some(s)) = (node.process, node.state) else {
            return Ok(Vec::new());
        };
        if self.is_atomic(p, Some(s)) {
            self.atomic_reached.insert((p, s));
        }
        let nevers: Vec<Option<IndexedEdge>> = match (&self.spec.never, node.never) {
            (Some(_), Some(n)) => self.edges(None, n)?.into_iter().map(Some).collect(),
            _ => vec![None],
        };

        let mut children = Vec::new();
        for edge in self.edges(Some(p), s)? {
            for never in &nevers {
                if self.is_rendezvous_send(Some(p), &edge.edge)? {
                    let Some(index) = edge.index else { continue };
                    for t in self.rendezvous_for_send(p, index, never.as_ref(), node.never)? {
                        children.push(t.end);
                        self.add(t);
                    }
                    let nto = never.as_ref().and_then(|n| n.edge.to);
                    children.push(Node::new(Some(p), edge.edge.to, nto));
                } else if self.is_rendezvous_receive(Some(p), &edge.edge)? {
                    // compiled together with its senders
                } else if let Some(t) = self.plain(p, &edge, never.as_ref(), node.never)? {
                    children.push(t.end);
                    self.add(t);
                }
            }
        }
        Ok(children)
    }

    fn add(&mut self, mut t: Transition) {
        if t.accepting_loop {
            if let Some(n) = t.begin.never {
                self.never_accepting.insert(n);
            }
        }
        t.group = self.transitions.len();
        debug!(group = t.group, name = %t.name, guards = t.guards.len(), "transition");
        self.transitions.push(t);
    }

    // --- plain edges ---

    fn plain(
        &self,
        p: ProcId,
        edge: &IndexedEdge,
        never: Option<&IndexedEdge>,
        never_state: Option<StateId>,
    ) -> BuildResult<Option<Transition>> {
        let from = edge.edge.from;
        let to = edge.edge.to;
        let mut t = Transition::new(TransitionKind::Plain, Some(p), Node::new(Some(p), Some(from), never_state));
        t.span = edge.edge.span;
        t.name = self.edge_name(p, &edge.edge);

        t.push_guard(self.pc_is(p, from));
        self.process_guards(&mut t, p, to);
        if self.has_atomic {
            t.push_guard(self.may_run(&[p]));
        }
        self.push_enabled(&mut t, Some(p), edge)?;
        let step = self.never_step(&mut t, never)?;
        if t.is_never_enabled() {
            warn!(transition = %t.name, "guard can never hold, transition pruned");
            return Ok(None);
        }
        if step == NeverMove::Stutter {
            return Ok(Some(t));
        }

        self.location_effects(&mut t, p, to);
        self.priority_effects(&mut t, p, &[(p, Some(from))], to);
        self.push_actions(&mut t, Some(p), &edge.edge.actions)?;
        self.never_effect(&mut t, step)?;

        t.atomic = self.is_atomic(p, Some(from));
        t.leaves_atomic = t.atomic && !self.is_atomic(p, to);
        t.progress = self.is_progress(p, to);
        t.end = Node::new(Some(p), to, never.and_then(|n| n.edge.to));
        Ok(Some(t))
    }

    /// Guards a process adds to any step it takes: its enabler and, for a
    /// dying step, the death order.
    fn process_guards(&self, t: &mut Transition, p: ProcId, to: Option<StateId>) {
        if let Some(enabler) = &self.process(p).enabler {
            t.push_guard(enabler.clone());
        }
        if to.is_none() && p.0 + 1 < self.spec.processes.len() {
            let next = ProcId(p.0 + 1);
            t.push_guard(Expr::eq(Expr::var(self.sv.pc(next)), Expr::constant(-1)));
        }
    }

    /// Move the program counter of `p`, or let `p` die.
    fn location_effects(&self, t: &mut Transition, p: ProcId, to: Option<StateId>) {
        let pc = Identifier::new(self.sv.pc(p));
        match to {
            Some(s) => t.effects.push(Effect::Action(Action::assign(pc, state_const(s)))),
            None => {
                t.effects.push(Effect::Action(Action::assign(pc, Expr::constant(-1))));
                t.effects.push(Effect::Reset(p));
                if let Some(nr) = self.sv.nr_pr() {
                    t.effects.push(Effect::Action(Action::decr(Identifier::new(nr))));
                }
            }
        }
    }

    /// Hand priority to `holder` when it ends inside an atomic sequence,
    /// release it when any of `sources` was atomic.
    fn priority_effects(
        &self,
        t: &mut Transition,
        holder: ProcId,
        sources: &[(ProcId, Option<StateId>)],
        target: Option<StateId>,
    ) {
        if !self.has_atomic {
            return;
        }
        let priority = Identifier::new(self.sv.priority());
        if self.is_atomic(holder, target) {
            t.effects.push(Effect::Action(Action::assign(priority, Expr::constant(holder.0 as i32))));
        } else if sources.iter().any(|&(p, s)| self.is_atomic(p, s)) {
            t.effects.push(Effect::Action(Action::assign(priority, Expr::constant(-1))));
        }
    }

    fn push_actions(&self, t: &mut Transition, owner: Option<ProcId>, actions: &[Action]) -> BuildResult<()> {
        for action in actions {
            match action {
                Action::Assign {
                    target,
                    op: AssignOp::Set,
                    value: run @ Expr::Run(_),
                    span,
                } => {
                    let nr = self
                        .sv
                        .nr_pr()
                        .ok_or_else(|| BuildError::internal("run expression without a live process counter"))?;
                    t.effects.push(Effect::Action(Action::Expr {
                        expr: run.clone(),
                        span: *span,
                    }));
                    t.effects.push(Effect::Action(Action::Assign {
                        target: target.clone(),
                        op: AssignOp::Set,
                        value: Expr::binary(BinOp::Sub, Expr::var(nr), Expr::constant(1)),
                        span: *span,
                    }));
                }
                Action::Else { .. } | Action::Label { .. } | Action::Goto { .. } | Action::Break { .. } => {}
                Action::Send { chan, span, .. } | Action::Receive { chan, span, .. } => {
                    if self.channel(owner, chan, *span)?.is_rendezvous() {
                        return Err(BuildError::unsupported(
                            self.process_name(owner),
                            "a rendezvous operation that does not start its step",
                            *span,
                        ));
                    }
                    t.effects.push(Effect::Action(action.clone()));
                }
                other => t.effects.push(Effect::Action(other.clone())),
            }
        }
        Ok(())
    }

    // --- never claim ---

    fn never_step(&self, t: &mut Transition, never: Option<&IndexedEdge>) -> BuildResult<NeverMove> {
        let Some(edge) = never else {
            return Ok(NeverMove::Absent);
        };
        let Some(to) = edge.edge.to else {
            t.accepting_loop = true;
            t.name.push_str(" [claim ended]");
            return Ok(NeverMove::Stutter);
        };
        t.push_guard(self.never_is(edge.edge.from)?);
        self.push_enabled(t, None, edge)?;
        Ok(NeverMove::Goto(to))
    }

    fn never_effect(&self, t: &mut Transition, step: NeverMove) -> BuildResult<()> {
        if let NeverMove::Goto(to) = step {
            let pc = self.never_pc()?;
            t.effects.push(Effect::Action(Action::assign(Identifier::new(pc), state_const(to))));
        }
        Ok(())
    }

    fn never_pc(&self) -> BuildResult<spins_ast::VarId> {
        self.sv
            .never_pc()
            .ok_or_else(|| BuildError::internal("never claim without a program counter"))
    }

    fn never_is(&self, s: StateId) -> BuildResult<Expr> {
        Ok(Expr::eq(Expr::var(self.never_pc()?), state_const(s)))
    }

    // --- lookups ---

    fn process(&self, p: ProcId) -> &'a Process {
        &self.spec.processes[p.0]
    }

    fn process_name(&self, owner: Option<ProcId>) -> &'a str {
        match owner {
            Some(p) => self.spec.processes.get(p.0).map_or("?", |p| p.name.as_str()),
            None => self.spec.never.as_ref().map_or("never", |n| n.name.as_str()),
        }
    }

    fn automaton(&self, owner: Option<ProcId>) -> BuildResult<&'a Automaton> {
        match owner {
            Some(p) => Ok(&self.process(p).automaton),
            None => self
                .spec
                .never
                .as_ref()
                .map(|n| &n.automaton)
                .ok_or_else(|| BuildError::internal("never claim edge without a never claim")),
        }
    }

    fn state(&self, p: ProcId, s: Option<StateId>) -> Option<&'a State> {
        s.and_then(|s| self.process(p).automaton.state(s))
    }

    fn is_atomic(&self, p: ProcId, s: Option<StateId>) -> bool {
        self.state(p, s).is_some_and(|s| s.atomic)
    }

    fn is_progress(&self, p: ProcId, s: Option<StateId>) -> bool {
        self.state(p, s).is_some_and(State::is_progress)
    }

    /// Outgoing edges of `state`; a state without any gets an implicit
    /// death edge.
    fn edges(&self, owner: Option<ProcId>, state: StateId) -> BuildResult<Vec<IndexedEdge>> {
        let automaton = self.automaton(owner)?;
        if automaton.state(state).is_none() {
            return Err(BuildError::UnknownState {
                process: self.process_name(owner).to_string(),
                state: state.0,
            });
        }
        let mut edges: Vec<IndexedEdge> = automaton
            .outgoing(state)
            .map(|(index, edge)| IndexedEdge {
                index: Some(index),
                edge: edge.clone(),
            })
            .collect();
        if edges.is_empty() {
            edges.push(IndexedEdge {
                index: None,
                edge: Edge {
                    from: state,
                    to: None,
                    actions: Vec::new(),
                    span: Span::dummy(),
                },
            });
        }
        Ok(edges)
    }

    fn pc_is(&self, p: ProcId, s: StateId) -> Expr {
        Expr::eq(Expr::var(self.sv.pc(p)), state_const(s))
    }

    /// `priority == -1 || priority == p` for every `p` in `parties`.
    fn may_run(&self, parties: &[ProcId]) -> Expr {
        let priority = || Expr::var(self.sv.priority());
        Expr::disjunction(
            std::iter::once(Expr::eq(priority(), Expr::constant(-1)))
                .chain(parties.iter().map(|p| Expr::eq(priority(), Expr::constant(p.0 as i32)))),
        )
    }

    fn edge_name(&self, p: ProcId, edge: &Edge) -> String {
        let what = if edge.actions.is_empty() {
            "-end-".to_string()
        } else {
            edge.actions
                .iter()
                .map(|a| pretty_print_action(a, self.variables))
                .collect::<Vec<_>>()
                .join("; ")
        };
        format!("{}({}): {}", self.process(p).name, edge.from.0, what)
    }
}

fn state_const(s: StateId) -> Expr {
    Expr::constant(s.0 as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spins_ast::{SpecBuilder, VarType};

    fn build(spec: &Specification) -> Built {
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(spec, &mut vars).unwrap();
        build_transitions(spec, &vars, &sv, &Options::default()).unwrap()
    }

    #[test]
    fn test_sequence_and_death() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("A", |p| {
            p.sequence(vec![
                Action::assign(Identifier::new(x), Expr::constant(1)),
                Action::assign(Identifier::new(x), Expr::constant(2)),
            ]);
        });
        b.process("B", |_| {});
        let built = build(&b.build());
        let per_process = |i| {
            built
                .transitions
                .iter()
                .filter(|t| t.process == Some(ProcId(i)))
                .count()
        };
        assert_eq!(per_process(0), 3);
        assert_eq!(per_process(1), 1);
        let death = built.transitions.iter().find(|t| t.end.state.is_none()).unwrap();
        assert!(death.effects.contains(&Effect::Reset(death.process.unwrap())));
    }

    #[test]
    fn test_constant_false_edge_is_pruned() {
        let mut b = SpecBuilder::new();
        b.process("A", |p| {
            p.sequence(vec![Action::expr(Expr::bool(false))]);
        });
        let built = build(&b.build());
        assert!(built.transitions.iter().all(|t| t.begin.state != Some(StateId(0))));
    }

    #[test]
    fn test_atomic_cycle_detected() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("A", |p| {
            let s0 = p.start();
            let s1 = p.atomic_state();
            let s2 = p.atomic_state();
            p.edge(s0, Some(s1), vec![Action::skip()]);
            p.edge(s1, Some(s2), vec![Action::incr(Identifier::new(x))]);
            p.edge(s2, Some(s1), vec![Action::decr(Identifier::new(x))]);
        });
        assert!(build(&b.build()).has_atomic_cycles);
    }

    #[test]
    fn test_loop_outside_atomic_is_not_a_cycle() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("A", |p| {
            let s0 = p.start();
            p.edge(s0, Some(s0), vec![Action::incr(Identifier::new(x))]);
        });
        assert!(!build(&b.build()).has_atomic_cycles);
    }

    #[test]
    fn test_run_assignment_reads_counter() {
        let mut b = SpecBuilder::new();
        let pid = b.global(Variable::new("pid", VarType::byte()));
        b.instance("w", "worker", false, |_| {});
        b.process("init", |p| {
            p.sequence(vec![Action::assign(
                Identifier::new(pid),
                Expr::Run(spins_ast::RunExpr {
                    proctype: "worker".into(),
                    args: vec![],
                    span: Span::dummy(),
                    targets: vec![ProcId(0)],
                    inits: vec![],
                }),
            )]);
        });
        let built = build(&b.build());
        let t = built
            .transitions
            .iter()
            .find(|t| t.process == Some(ProcId(1)) && t.begin.state == Some(StateId(0)))
            .unwrap();
        let actions: Vec<_> = t.actions().collect();
        assert!(matches!(actions[1], Action::Expr { expr: Expr::Run(_), .. }));
        assert!(matches!(
            actions[2],
            Action::Assign {
                value: Expr::Binary { op: BinOp::Sub, .. },
                ..
            }
        ));
    }
}
