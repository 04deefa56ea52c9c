//! Deadlock, the never claim continuation and remote reference checks.

use super::{Builder, IndexedEdge};
use crate::error::{BuildError, BuildResult};
use crate::model::guard::Guard;
use crate::model::transition::{Effect, Node, Transition, TransitionKind};
use crate::model::Assertion;
use spins_ast::{Action, Expr, Identifier, ProcId, StateId};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

impl Builder<'_> {
    pub(super) fn mark_timeouts(&mut self) {
        for t in &mut self.transitions {
            t.timeout = t.guards.iter().any(Guard::contains_timeout);
        }
    }

    /// No group without `timeout` in its guards is enabled. Groups with
    /// identical guards contribute once.
    pub(super) fn deadlock(&self) -> Guard {
        let mut seen = HashSet::new();
        let mut disabled = Vec::new();
        for t in &self.transitions {
            if t.timeout || t.buchi || !seen.insert(&t.guards) {
                continue;
            }
            disabled.push(Guard::Nand(t.guards.clone()));
        }
        Guard::And(disabled)
    }

    /// Compile every never claim edge a second time as a stand-alone step
    /// guarded by `deadlock`.
    pub(super) fn never_continuation(&mut self, deadlock: &Guard) -> BuildResult<()> {
        let spec = self.spec;
        let Some(never) = &spec.never else {
            return Ok(());
        };
        if self.transitions.iter().any(|t| t.timeout) {
            return Err(BuildError::unsupported(
                &never.name,
                "timeout together with a never claim",
                never.span,
            ));
        }
        if !self.options.never_deadlock_continuation {
            return Ok(());
        }

        let automaton = &never.automaton;
        let mut reached = BTreeSet::from([automaton.start]);
        let mut queue = vec![automaton.start];
        while let Some(s) = queue.pop() {
            for (_, edge) in automaton.outgoing(s) {
                if let Some(to) = edge.to {
                    if reached.insert(to) {
                        queue.push(to);
                    }
                }
            }
        }

        let never_pc = self.never_pc()?;
        let mut added = 0;
        for s in reached {
            for (index, edge) in automaton.outgoing(s) {
                let mut t = Transition::new(TransitionKind::NeverStep, None, Node::new(None, None, Some(s)));
                t.name = format!("{}({}): step in deadlock", never.name, s.0);
                t.span = edge.span;
                t.push_guard(self.never_is(s)?);
                let indexed = IndexedEdge {
                    index: Some(index),
                    edge: edge.clone(),
                };
                self.push_enabled(&mut t, None, &indexed)?;
                t.push_guard(deadlock.clone());
                if t.is_never_enabled() {
                    continue;
                }
                let target = edge.to.map_or(-1, |to: StateId| to.0 as i32);
                t.effects.push(Effect::Action(Action::assign(
                    Identifier::new(never_pc),
                    Expr::constant(target),
                )));
                t.buchi = true;
                t.end = Node::new(None, None, edge.to);
                self.add(t);
                added += 1;
            }
        }
        debug!(added, "never claim continuation steps");
        Ok(())
    }

    /// One pid check per process named by a remote reference.
    pub(super) fn assertions(&self) -> BuildResult<Vec<Assertion>> {
        let mut referenced: BTreeSet<ProcId> = BTreeSet::new();
        let mut collect = |e: &Expr| {
            if let Expr::RemoteRef { process, .. } = e {
                referenced.insert(*process);
            }
        };
        for t in &self.transitions {
            for g in &t.guards {
                g.visit_exprs(&mut collect);
            }
            for a in t.actions() {
                a.visit_exprs(&mut collect);
            }
        }
        for export in &self.spec.exports {
            export.expr.visit(&mut collect);
        }
        if let Some(progress) = &self.spec.progress {
            progress.visit(&mut collect);
        }

        let mut out = Vec::with_capacity(referenced.len());
        for p in referenced {
            let process = self
                .spec
                .processes
                .get(p.0)
                .ok_or_else(|| BuildError::internal(format!("remote reference to process #{}", p.0)))?;
            let pid = || Expr::var(self.sv.pid(p));
            out.push(Assertion {
                expr: Expr::or(
                    Expr::eq(pid(), Expr::constant(-1)),
                    Expr::eq(pid(), Expr::constant(p.0 as i32)),
                ),
                message: format!(
                    "statically computed pid ({}) of process {} differs from its actual pid",
                    p.0, process.name
                ),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::build_transitions;
    use crate::model::transition::TransitionKind;
    use crate::options::Options;
    use crate::state::StateVector;
    use spins_ast::*;

    fn with_never(timeout: bool) -> Specification {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("P", |p| {
            let first = if timeout {
                Action::expr(Expr::Timeout)
            } else {
                Action::assign(Identifier::new(x), Expr::constant(1))
            };
            p.sequence(vec![first]);
        });
        b.never(|n| {
            let s0 = n.start();
            n.label(s0, "accept_all");
            n.edge(s0, Some(s0), vec![Action::skip()]);
        });
        b.build()
    }

    #[test]
    fn test_never_steps_in_deadlock() {
        let spec = with_never(false);
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let built = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap();
        let steps: Vec<_> = built
            .transitions
            .iter()
            .filter(|t| t.kind == TransitionKind::NeverStep)
            .collect();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].buchi);
        assert!(steps[0].process.is_none());
    }

    #[test]
    fn test_continuation_can_be_disabled() {
        let spec = with_never(false);
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let options = Options {
            never_deadlock_continuation: false,
            ..Options::default()
        };
        let built = build_transitions(&spec, &vars, &sv, &options).unwrap();
        assert!(built.transitions.iter().all(|t| !t.buchi));
    }

    #[test]
    fn test_timeout_with_never_claim_is_rejected() {
        let spec = with_never(true);
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let err = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap_err();
        assert!(err.to_string().contains("timeout together with a never claim"));
    }

    #[test]
    fn test_remote_reference_yields_pid_assertion() {
        let mut b = SpecBuilder::new();
        b.process("A", |p| {
            p.sequence(vec![Action::skip()]);
        });
        b.process("B", |p| {
            p.sequence(vec![Action::expr(Expr::RemoteRef {
                process: ProcId(0),
                state: StateId(1),
                label: "done".into(),
            })]);
        });
        let spec = b.build();
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(&spec, &mut vars).unwrap();
        let built = build_transitions(&spec, &vars, &sv, &Options::default()).unwrap();
        assert_eq!(built.assertions.len(), 1);
        assert!(built.assertions[0].message.contains("process A"));
    }
}
