//! Rendezvous pairing.
//!
//! A send on a zero-capacity channel is never compiled on its own. Each
//! send site is combined with every receive site on the same channel into
//! one synchronized transition that moves both processes.

use super::{Builder, IndexedEdge, NeverMove};
use crate::error::{BuildError, BuildResult};
use crate::model::transition::{Effect, Node, Transition, TransitionKind};
use spins_ast::{Action, Expr, Identifier, ProcId, Span, Specification, StateId, VarId, Variable};
use std::collections::HashMap;

/// One rendezvous statement: the first action of an automaton edge.
#[derive(Debug, Clone)]
pub(super) struct Site {
    pub process: ProcId,
    pub edge: usize,
    pub from: StateId,
    pub to: Option<StateId>,
    pub chan: Identifier,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Send and receive sites per channel variable.
#[derive(Debug, Default)]
pub(super) struct Sites {
    sends: HashMap<VarId, Vec<Site>>,
    receives: HashMap<VarId, Vec<Site>>,
}

impl Sites {
    pub(super) fn collect(spec: &Specification, variables: &[Variable]) -> Self {
        let mut sites = Sites::default();
        for (i, process) in spec.processes.iter().enumerate() {
            for (index, edge) in process.automaton.transitions.iter().enumerate() {
                let (chan, args, span, send) = match edge.first_action() {
                    Some(Action::Send { chan, args, span, .. }) => (chan, args, *span, true),
                    Some(Action::Receive { chan, args, span, .. }) => (chan, args, *span, false),
                    _ => continue,
                };
                if !is_rendezvous_channel(variables, chan) {
                    continue;
                }
                let site = Site {
                    process: ProcId(i),
                    edge: index,
                    from: edge.from,
                    to: edge.to,
                    chan: chan.clone(),
                    args: args.clone(),
                    span,
                };
                let table = if send { &mut sites.sends } else { &mut sites.receives };
                table.entry(chan.var).or_default().push(site);
            }
        }
        sites
    }

    fn find(table: &HashMap<VarId, Vec<Site>>, p: ProcId, edge: usize) -> Option<&Site> {
        table.values().flatten().find(|s| s.process == p && s.edge == edge)
    }

    fn on(table: &HashMap<VarId, Vec<Site>>, chan: VarId) -> &[Site] {
        table.get(&chan).map_or(&[], Vec::as_slice)
    }
}

fn is_rendezvous_channel(variables: &[Variable], chan: &Identifier) -> bool {
    variables
        .get(chan.var.0)
        .and_then(|v| v.ty.as_channel())
        .is_some_and(|ct| ct.capacity == Some(0))
}

impl Builder<'_> {
    pub(super) fn is_rendezvous_send(&self, owner: Option<ProcId>, edge: &spins_ast::Transition) -> BuildResult<bool> {
        match edge.first_action() {
            Some(Action::Send { chan, span, .. }) => Ok(self.channel(owner, chan, *span)?.is_rendezvous()),
            _ => Ok(false),
        }
    }

    pub(super) fn is_rendezvous_receive(&self, owner: Option<ProcId>, edge: &spins_ast::Transition) -> BuildResult<bool> {
        match edge.first_action() {
            Some(Action::Receive { chan, span, .. }) => Ok(self.channel(owner, chan, *span)?.is_rendezvous()),
            _ => Ok(false),
        }
    }

    /// Every synchronized transition the send at edge `index` of `p` takes
    /// part in, combined with the never claim step `never`.
    pub(super) fn rendezvous_for_send(
        &self,
        p: ProcId,
        index: usize,
        never: Option<&IndexedEdge>,
        never_state: Option<StateId>,
    ) -> BuildResult<Vec<Transition>> {
        let send = Sites::find(&self.sites.sends, p, index)
            .ok_or_else(|| BuildError::internal(format!("no rendezvous site for edge {} of {}", index, p.0)))?;
        let mut out = Vec::new();
        for recv in Sites::on(&self.sites.receives, send.chan.var) {
            if let Some(t) = self.pair(send, recv, never, never_state)? {
                out.push(t);
            }
        }
        Ok(out)
    }

    /// The synchronized transitions the rendezvous statement at edge
    /// `index` of `p` takes part in, as a sender or a receiver, without
    /// never claim steps.
    pub(super) fn rendezvous_partners(&self, p: ProcId, index: usize) -> BuildResult<Vec<Transition>> {
        let mut out = Vec::new();
        if let Some(send) = Sites::find(&self.sites.sends, p, index) {
            for recv in Sites::on(&self.sites.receives, send.chan.var) {
                out.extend(self.pair(send, recv, None, None)?);
            }
        } else if let Some(recv) = Sites::find(&self.sites.receives, p, index) {
            for send in Sites::on(&self.sites.sends, recv.chan.var) {
                out.extend(self.pair(send, recv, None, None)?);
            }
        }
        Ok(out)
    }

    fn pair(
        &self,
        send: &Site,
        recv: &Site,
        never: Option<&IndexedEdge>,
        never_state: Option<StateId>,
    ) -> BuildResult<Option<Transition>> {
        if send.process == recv.process {
            return Ok(None);
        }
        let send_index = send.chan.index.as_deref();
        let recv_index = recv.chan.index.as_deref();
        if let (Some(a), Some(b)) = (
            send_index.and_then(Expr::constant_value),
            recv_index.and_then(Expr::constant_value),
        ) {
            if a != b {
                return Ok(None);
            }
        }
        if send.args.len() != recv.args.len() {
            return Err(BuildError::RendezvousArity {
                process: self.process(send.process).name.clone(),
                channel: self.sv.name(send.chan.var).to_string(),
                sent: send.args.len(),
                received: recv.args.len(),
                span: recv.span,
            });
        }
        for (s, r) in send.args.iter().zip(&recv.args) {
            if let (Some(a), Some(b)) = (s.constant_value(), r.constant_value()) {
                if a != b {
                    return Ok(None);
                }
            }
        }

        let send_edge = self.site_edge(send)?;
        let recv_edge = self.site_edge(recv)?;
        if send_edge.actions.len() > 1 {
            return Err(BuildError::unsupported(
                &self.process(send.process).name,
                "statements following a rendezvous send in the same step",
                send.span,
            ));
        }

        let kind = TransitionKind::Rendezvous {
            receiver: recv.process,
            receiver_state: recv.from,
        };
        let mut t = Transition::new(kind, Some(send.process), Node::new(Some(send.process), Some(send.from), never_state));
        t.span = send.span;
        t.name = format!(
            "{} || {}",
            self.edge_name(send.process, send_edge),
            self.edge_name(recv.process, recv_edge)
        );

        t.push_guard(self.pc_is(send.process, send.from));
        t.push_guard(self.pc_is(recv.process, recv.from));
        self.process_guards(&mut t, send.process, send.to);
        self.process_guards(&mut t, recv.process, recv.to);
        if self.has_atomic {
            t.push_guard(self.may_run(&[send.process, recv.process]));
        }
        if let (Some(a), Some(b)) = (send_index, recv_index) {
            if a.constant_value().is_none() || b.constant_value().is_none() {
                t.push_guard(Expr::eq(a.clone(), b.clone()));
            }
        }
        for (s, r) in send.args.iter().zip(&recv.args) {
            if !matches!(r, Expr::Ident(_)) {
                t.push_guard(Expr::eq(s.clone(), r.clone()));
            }
        }
        let step = self.never_step(&mut t, never)?;
        if t.is_never_enabled() {
            return Ok(None);
        }
        if step == NeverMove::Stutter {
            return Ok(Some(t));
        }

        for (s, r) in send.args.iter().zip(&recv.args) {
            if let Expr::Ident(target) = r {
                t.effects.push(Effect::Action(Action::assign(target.clone(), s.clone())));
            }
        }
        self.location_effects(&mut t, send.process, send.to);
        self.location_effects(&mut t, recv.process, recv.to);
        self.push_actions(&mut t, Some(recv.process), recv_edge.actions.get(1..).unwrap_or_default())?;
        self.priority_effects(
            &mut t,
            recv.process,
            &[
                (send.process, Some(send.from)),
                (send.process, send.to),
                (recv.process, Some(recv.from)),
            ],
            recv.to,
        );
        self.never_effect(&mut t, step)?;

        t.atomic = self.is_atomic(send.process, Some(send.from));
        t.leaves_atomic = t.atomic && !self.is_atomic(recv.process, recv.to);
        t.progress = self.is_progress(send.process, send.to) || self.is_progress(recv.process, recv.to);
        t.end = Node::new(Some(recv.process), recv.to, never.and_then(|n| n.edge.to));
        Ok(Some(t))
    }

    fn site_edge(&self, site: &Site) -> BuildResult<&spins_ast::Transition> {
        self.process(site.process)
            .automaton
            .transitions
            .get(site.edge)
            .ok_or_else(|| BuildError::internal(format!("rendezvous site {} out of range", site.edge)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::build_transitions;
    use crate::model::transition::TransitionKind;
    use crate::options::Options;
    use crate::state::StateVector;
    use spins_ast::*;

    fn rendezvous_spec(receivers: usize) -> Specification {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(0, vec![ScalarType::Byte])));
        b.process("S", |p| {
            p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(3)])]);
        });
        for i in 0..receivers {
            b.process(&format!("R{}", i), |p| {
                let v = p.local(Variable::new("v", VarType::byte()));
                p.sequence(vec![Action::receive(Identifier::new(c), vec![Expr::var(v)])]);
            });
        }
        b.build()
    }

    #[test]
    fn test_one_transition_per_pair() {
        let spec = rendezvous_spec(2);
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let built = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap();
        let pairs: Vec<_> = built
            .transitions
            .iter()
            .filter(|t| matches!(t.kind, TransitionKind::Rendezvous { .. }))
            .collect();
        assert_eq!(pairs.len(), 2);
        // no receive survives on its own
        assert!(built
            .transitions
            .iter()
            .filter(|t| t.kind == TransitionKind::Plain)
            .all(|t| t.begin.state != Some(StateId(0))));
        // the received value is copied into the receiver's variable
        assert!(pairs[0].actions().any(|a| matches!(
            a,
            Action::Assign { value: Expr::Const { value: 3 }, .. }
        )));
    }

    #[test]
    fn test_constant_mismatch_never_pairs() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(0, vec![ScalarType::Byte])));
        b.process("S", |p| {
            p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(1)])]);
        });
        b.process("R", |p| {
            p.sequence(vec![Action::receive(Identifier::new(c), vec![Expr::constant(2)])]);
        });
        let spec = b.build();
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let built = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap();
        assert!(built
            .transitions
            .iter()
            .all(|t| !matches!(t.kind, TransitionKind::Rendezvous { .. })));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(0, vec![ScalarType::Byte])));
        b.process("S", |p| {
            p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(1)])]);
        });
        b.process("R", |p| {
            let v = p.local(Variable::new("v", VarType::byte()));
            p.sequence(vec![Action::receive(Identifier::new(c), vec![Expr::var(v), Expr::var(v)])]);
        });
        let spec = b.build();
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let err = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::BuildError::RendezvousArity { sent: 1, received: 2, .. }
        ));
    }
}
