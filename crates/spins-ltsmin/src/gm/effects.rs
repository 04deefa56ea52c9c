//! What a transition is known to leave behind in the slots it writes.

use super::predicate::{Dnf, Reference};
use crate::dm::{Marks, Walker};
use crate::error::BuildResult;
use crate::model::transition::{Effect, Transition};
use crate::state::StateVector;
use spins_ast::{Action, AssignOp, Expr, Identifier, VarId};
use std::collections::HashMap;

/// Value of a written slot after the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Knowledge {
    Value(i64),
    Unknown,
}

/// Post-state knowledge of one transition, keyed by slot. Slots missing
/// from the map are not written.
#[derive(Debug, Clone, Default)]
pub(crate) struct EffectSummary {
    after: HashMap<usize, Knowledge>,
}

impl EffectSummary {
    pub(crate) fn of(t: &Transition, sv: &StateVector, walker: &Walker<'_>) -> BuildResult<Self> {
        let mut summary = EffectSummary::default();
        for effect in &t.effects {
            match effect {
                Effect::Action(action) => summary.action(action, sv, walker)?,
                Effect::Reset(p) => {
                    let pc = sv.scalar_slot(sv.pc(*p));
                    for s in sv.process_slots(*p) {
                        if Some(s) != pc {
                            let initial = i64::from(sv.slot(s).initial);
                            summary.after.insert(s, Knowledge::Value(initial));
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    fn action(&mut self, action: &Action, sv: &StateVector, walker: &Walker<'_>) -> BuildResult<()> {
        if let Action::Assign { target, op, value, .. } = action {
            if let Some(slot) = exact_slot(target, sv) {
                let next = match (op, self.after.get(&slot)) {
                    (AssignOp::Set, _) => value.constant_value().map(i64::from),
                    (AssignOp::Incr, Some(Knowledge::Value(v))) => Some(v + 1),
                    (AssignOp::Decr, Some(Knowledge::Value(v))) => Some(v - 1),
                    _ => None,
                };
                let (lo, hi) = sv.slot(slot).ty.bounds();
                let k = match next {
                    Some(v) if (lo..=hi).contains(&v) => Knowledge::Value(v),
                    _ => Knowledge::Unknown,
                };
                self.after.insert(slot, k);
                return Ok(());
            }
        }
        let mut marks = Marks::new(sv.len());
        walker.action(action, &mut marks, true)?;
        for s in marks.may.ones() {
            self.after.insert(s, Knowledge::Unknown);
        }
        Ok(())
    }

    /// Fold in a transition that may run after this one within the same
    /// step. Whatever it writes is no longer known.
    pub(crate) fn absorb(&mut self, follow_up: &EffectSummary) {
        for &s in follow_up.after.keys() {
            self.after.insert(s, Knowledge::Unknown);
        }
    }

    pub(crate) fn knowledge(&self, slot: usize) -> Option<Knowledge> {
        self.after.get(&slot).copied()
    }

    /// Whether some disjunct of `after` may hold once the transition has
    /// executed.
    pub(crate) fn may_satisfy(&self, after: &Dnf) -> bool {
        after.iter().any(|conj| {
            conj.preds.iter().all(|p| match &p.reference {
                Reference::Slot(s) => match self.knowledge(*s) {
                    Some(Knowledge::Value(v)) => p.holds_for(v),
                    _ => true,
                },
                Reference::Symbolic(_) => true,
            })
        })
    }

    /// Whether some complete disjunct of `after` certainly holds once the
    /// transition has executed.
    pub(crate) fn must_satisfy(&self, after: &Dnf) -> bool {
        after.iter().any(|conj| {
            conj.complete
                && conj.preds.iter().all(|p| match &p.reference {
                    Reference::Slot(s) => {
                        matches!(self.knowledge(*s), Some(Knowledge::Value(v)) if p.holds_for(v))
                    }
                    Reference::Symbolic(_) => false,
                })
        })
    }
}

fn exact_slot(id: &Identifier, sv: &StateVector) -> Option<usize> {
    let r = sv.resolve_write(id).ok()?;
    (r.exact && r.slots.len() == 1).then(|| r.slots[0])
}

/// How a transition touches one slot, for commutation checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Only assigned this constant.
    Assign(i64),
    /// Only incremented or decremented.
    Count,
    /// Only touched by sends on this channel.
    Send(VarId),
    /// Only touched by head receives on this channel.
    Receive(VarId),
    Other,
}

impl Access {
    fn merge(self, other: Access) -> Access {
        match (self, other) {
            (a, b) if a == b => a,
            _ => Access::Other,
        }
    }

    /// Executing the two accesses in either order gives the same slot value.
    pub(crate) fn commutes_with(self, other: Access) -> bool {
        match (self, other) {
            (Access::Assign(a), Access::Assign(b)) => a == b,
            (Access::Count, Access::Count) => true,
            (Access::Send(a), Access::Receive(b)) | (Access::Receive(a), Access::Send(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn is_channel(self) -> bool {
        matches!(self, Access::Send(_) | Access::Receive(_))
    }
}

/// Access kind per slot of the effects of a transition.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccessSummary {
    slots: HashMap<usize, Access>,
}

impl AccessSummary {
    pub(crate) fn of(t: &Transition, sv: &StateVector, walker: &Walker<'_>) -> BuildResult<Self> {
        let mut summary = AccessSummary::default();
        for effect in &t.effects {
            match effect {
                Effect::Action(action) => summary.action(action, sv, walker)?,
                Effect::Reset(p) => sv.process_slots(*p).for_each(|s| summary.note(s, Access::Other)),
            }
        }
        Ok(summary)
    }

    /// Fold in a follow-up transition: every slot it touches becomes
    /// `Other`.
    pub(crate) fn absorb(&mut self, follow_up: &AccessSummary) {
        for &s in follow_up.slots.keys() {
            self.slots.insert(s, Access::Other);
        }
    }

    fn note(&mut self, slot: usize, access: Access) {
        let merged = match self.slots.get(&slot) {
            Some(prev) => prev.merge(access),
            None => access,
        };
        self.slots.insert(slot, merged);
    }

    fn action(&mut self, action: &Action, sv: &StateVector, walker: &Walker<'_>) -> BuildResult<()> {
        match action {
            Action::Assign {
                target,
                op: AssignOp::Set,
                value,
                ..
            } => {
                if let (Some(slot), Some(v)) = (exact_slot(target, sv), value.constant_value()) {
                    self.note(slot, Access::Assign(i64::from(v)));
                    return Ok(());
                }
            }
            Action::Assign { target, .. } => {
                if let Some(slot) = exact_slot(target, sv) {
                    self.note(slot, Access::Count);
                    return Ok(());
                }
            }
            Action::Send {
                chan,
                args,
                sorted: false,
                ..
            } if chan.is_plain() => {
                self.channel(chan, Access::Send(chan.var), sv)?;
                for arg in args {
                    self.reads(arg, sv, walker)?;
                }
                return Ok(());
            }
            Action::Receive {
                chan,
                args,
                poll: false,
                random: false,
                ..
            } if chan.is_plain() && args.iter().all(|a| a.constant_value().is_some()) => {
                self.channel(chan, Access::Receive(chan.var), sv)?;
                return Ok(());
            }
            _ => {}
        }
        let mut marks = Marks::new(sv.len());
        walker.action(action, &mut marks, true)?;
        for s in marks.read.ones().chain(marks.may.ones()) {
            self.note(s, Access::Other);
        }
        Ok(())
    }

    fn channel(&mut self, chan: &Identifier, access: Access, sv: &StateVector) -> BuildResult<()> {
        let all = sv.resolve(chan)?;
        for s in all.slots {
            self.note(s, access);
        }
        Ok(())
    }

    fn reads(&mut self, e: &Expr, sv: &StateVector, walker: &Walker<'_>) -> BuildResult<()> {
        let mut marks = Marks::new(sv.len());
        walker.expr(e, &mut marks)?;
        for s in marks.read.ones() {
            self.note(s, Access::Other);
        }
        Ok(())
    }

    /// Access to `slot`, `None` when the own effects do not touch it.
    pub(crate) fn get(&self, slot: usize) -> Option<Access> {
        self.slots.get(&slot).copied()
    }
}
