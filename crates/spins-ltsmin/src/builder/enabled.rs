//! Enabledness of the first statement of an edge.

use super::{Builder, IndexedEdge};
use crate::error::{BuildError, BuildResult};
use crate::model::guard::Guard;
use crate::model::transition::Transition;
use spins_ast::{Action, AssignOp, ChannelType, Expr, Identifier, ProcId, Span};

/// When a statement can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Enabled {
    Always,
    When(Guard),
    /// A rendezvous operation: enabled only together with a partner.
    Rendezvous,
}

impl Builder<'_> {
    /// Add the enabledness guard of `edge` to `t`. An `else` edge is
    /// enabled when none of its siblings is.
    pub(super) fn push_enabled(&self, t: &mut Transition, owner: Option<ProcId>, edge: &IndexedEdge) -> BuildResult<()> {
        if !edge.edge.is_else() {
            if let Some(first) = edge.edge.first_action() {
                match self.enabledness(owner, first)? {
                    Enabled::Always => {}
                    Enabled::When(g) => t.push_guard(g),
                    Enabled::Rendezvous => {
                        return Err(BuildError::internal("rendezvous operation reached the plain compiler"))
                    }
                }
            }
            return Ok(());
        }

        let automaton = self.automaton(owner)?;
        for (index, sibling) in automaton.outgoing(edge.edge.from) {
            if Some(index) == edge.index || sibling.is_else() {
                continue;
            }
            let Some(first) = sibling.first_action() else {
                t.push_guard(Guard::Nand(vec![]));
                continue;
            };
            match self.enabledness(owner, first)? {
                Enabled::Always => t.push_guard(Guard::Nand(vec![])),
                Enabled::When(g) => t.push_guard(Guard::Nand(vec![g])),
                Enabled::Rendezvous => {
                    let p = owner.ok_or_else(|| BuildError::internal("rendezvous inside a never claim"))?;
                    for partner in self.rendezvous_partners(p, index)? {
                        t.push_guard(Guard::Nand(partner.guards));
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn enabledness(&self, owner: Option<ProcId>, action: &Action) -> BuildResult<Enabled> {
        match action {
            Action::Assign {
                op: AssignOp::Set,
                value: run @ Expr::Run(_),
                ..
            } => Ok(Enabled::When(Guard::Expr(run.clone()))),
            Action::Assign { .. }
            | Action::Assert { .. }
            | Action::Print { .. }
            | Action::Break { .. }
            | Action::Else { .. }
            | Action::Goto { .. }
            | Action::Label { .. } => Ok(Enabled::Always),
            Action::Expr { expr, .. } => Ok(Enabled::When(Guard::Expr(expr.clone()))),
            Action::Send { chan, args, span, .. } => {
                let ct = self.channel(owner, chan, *span)?;
                if ct.is_rendezvous() {
                    return Ok(Enabled::Rendezvous);
                }
                self.check_arity(owner, chan, ct, args.len(), *span)?;
                Ok(Enabled::When(Guard::Expr(Expr::lt(
                    Expr::ident(chan.fill()),
                    Expr::constant(capacity(ct)),
                ))))
            }
            Action::Receive {
                chan,
                args,
                random,
                span,
                ..
            } => {
                let ct = self.channel(owner, chan, *span)?;
                if ct.is_rendezvous() {
                    return Ok(Enabled::Rendezvous);
                }
                self.check_arity(owner, chan, ct, args.len(), *span)?;
                if *random {
                    let rows = (0..capacity(ct))
                        .map(|r| {
                            let mut row = vec![Guard::Expr(Expr::gt(Expr::ident(chan.fill()), Expr::constant(r)))];
                            row.extend(message_matches(chan, args, r));
                            Guard::And(row)
                        })
                        .collect();
                    return Ok(Enabled::When(Guard::Or(rows)));
                }
                let mut head = vec![Guard::Expr(Expr::gt(Expr::ident(chan.fill()), Expr::constant(0)))];
                head.extend(message_matches(chan, args, 0));
                Ok(Enabled::When(Guard::And(head)))
            }
            Action::Options { options, span, .. } => {
                let mut alternatives = Vec::with_capacity(options.len());
                for branch in options {
                    let Some(first) = branch.first() else {
                        return Ok(Enabled::Always);
                    };
                    match self.enabledness(owner, first)? {
                        Enabled::Always => return Ok(Enabled::Always),
                        Enabled::When(g) => alternatives.push(g),
                        Enabled::Rendezvous => {
                            return Err(BuildError::unsupported(
                                self.process_name(owner),
                                "a rendezvous operation inside a d_step",
                                *span,
                            ))
                        }
                    }
                }
                Ok(Enabled::When(Guard::Or(alternatives)))
            }
        }
    }

    /// The type of the channel `chan` refers to. Its buffer size must be
    /// known by now.
    pub(super) fn channel(&self, owner: Option<ProcId>, chan: &Identifier, span: Span) -> BuildResult<&ChannelType> {
        let var = self
            .variables
            .get(chan.var.0)
            .ok_or(BuildError::UnknownVariable { var: chan.var.0, span })?;
        let ct = var
            .ty
            .as_channel()
            .ok_or_else(|| BuildError::internal(format!("{} is not a channel", var.name)))?;
        if ct.capacity.is_none() {
            return Err(BuildError::UnresolvedBufferSize {
                process: self.process_name(owner).to_string(),
                channel: self.sv.name(chan.var).to_string(),
                span,
            });
        }
        Ok(ct)
    }

    fn check_arity(
        &self,
        owner: Option<ProcId>,
        chan: &Identifier,
        ct: &ChannelType,
        found: usize,
        span: Span,
    ) -> BuildResult<()> {
        if ct.arity() == found {
            return Ok(());
        }
        Err(BuildError::MessageArity {
            process: self.process_name(owner).to_string(),
            channel: self.sv.name(chan.var).to_string(),
            expected: ct.arity(),
            found,
            span,
        })
    }
}

fn capacity(ct: &ChannelType) -> i32 {
    ct.capacity.unwrap_or(0) as i32
}

/// Non-identifier receive arguments must equal the message field in `row`.
fn message_matches(chan: &Identifier, args: &[Expr], row: i32) -> Vec<Guard> {
    args.iter()
        .enumerate()
        .filter(|(_, a)| !matches!(a, Expr::Ident(_)))
        .map(|(m, a)| Guard::Expr(Expr::eq(Expr::ident(chan.buffer(Expr::constant(row), m)), a.clone())))
        .collect()
}
