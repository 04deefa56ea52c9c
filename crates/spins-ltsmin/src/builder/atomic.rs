//! Atomic sequences: loss of atomicity fallbacks and follow-up groups.

use super::Builder;
use crate::error::BuildResult;
use crate::model::guard::Guard;
use crate::model::transition::{Effect, Node, Transition, TransitionKind};
use spins_ast::{Action, Expr, Identifier, ProcId, StateId};
use std::collections::{BTreeSet, HashMap};

type Location = (ProcId, StateId);

impl Builder<'_> {
    /// Groups guarded by each process location.
    fn participation(&self, with_timeout: bool) -> HashMap<Location, Vec<usize>> {
        let mut part: HashMap<Location, Vec<usize>> = HashMap::new();
        for t in &self.transitions {
            let system = matches!(t.kind, TransitionKind::Plain | TransitionKind::Rendezvous { .. });
            if !system || (t.timeout && !with_timeout) {
                continue;
            }
            for location in t.participants() {
                part.entry(location).or_default().push(t.group);
            }
        }
        part
    }

    /// One fallback per reached atomic location: when the process holding
    /// priority is blocked there, release the priority.
    pub(super) fn loss_of_atomicity(&mut self) -> BuildResult<()> {
        let part = self.participation(false);
        let reached: Vec<Location> = self.atomic_reached.iter().copied().collect();
        for (p, s) in reached {
            let mut t = Transition::new(TransitionKind::LossOfAtomicity, Some(p), Node::new(Some(p), Some(s), None));
            t.name = format!("{}({}): loss of atomicity", self.process(p).name, s.0);
            t.push_guard(Expr::eq(Expr::var(self.sv.priority()), Expr::constant(p.0 as i32)));
            t.push_guard(self.pc_is(p, s));
            let own: Vec<Guard> = part
                .get(&(p, s))
                .into_iter()
                .flatten()
                .map(|&g| Guard::And(self.transitions[g].guards.clone()))
                .collect();
            if !own.is_empty() {
                t.guards.push(Guard::Nand(vec![Guard::Or(own)]));
            }
            t.effects.push(Effect::Action(Action::assign(
                Identifier::new(self.sv.priority()),
                Expr::constant(-1),
            )));
            t.atomic = true;
            self.add(t);
        }
        Ok(())
    }

    /// Record for each group ending inside an atomic sequence the groups
    /// that may run next before priority is released.
    pub(super) fn follow_ups(&mut self) {
        let part = self.participation(true);
        let mut memo: HashMap<Location, Vec<usize>> = HashMap::new();
        for i in 0..self.transitions.len() {
            let t = &self.transitions[i];
            let system = matches!(t.kind, TransitionKind::Plain | TransitionKind::Rendezvous { .. });
            let (Some(p), Some(s)) = (t.end.process, t.end.state) else {
                continue;
            };
            if !system || t.accepting_loop || !self.is_atomic(p, Some(s)) {
                continue;
            }
            let ups = memo
                .entry((p, s))
                .or_insert_with(|| self.atomic_closure(&part, (p, s)))
                .clone();
            self.transitions[i].follow_ups = ups;
        }
    }

    /// Groups reachable from `start` without leaving atomic locations.
    fn atomic_closure(&self, part: &HashMap<Location, Vec<usize>>, start: Location) -> Vec<usize> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = vec![start];
        let mut out = BTreeSet::new();
        while let Some(location) = queue.pop() {
            for &g in part.get(&location).into_iter().flatten() {
                out.insert(g);
                let end = self.transitions[g].end;
                if let (Some(p), Some(s)) = (end.process, end.state) {
                    if self.is_atomic(p, Some(s)) && seen.insert((p, s)) {
                        queue.push((p, s));
                    }
                }
            }
        }
        out.into_iter().collect()
    }
}
