//! Guard matrices for partial order reduction.
//!
//! Every label is reduced to a DNF of simple predicates for both polarities.
//! Two labels are proven not co-enabled when no pair of their disjuncts is
//! jointly satisfiable; the same test on negated labels gives
//! co-disabledness and the mixed test feeds the enabling sets. A transition
//! is in the necessary enabling set of a label only if it may write a slot
//! the label reads, it can fire while the label is false, and (with
//! must-write facts) its known post values do not falsify the label.

mod effects;
mod predicate;

use crate::dm::{Dependencies, Walker};
use crate::error::BuildResult;
use crate::guard_info::{GuardInfo, LabelTable};
use crate::matrix::{DepMatrix, DepRow};
use crate::model::guard::Guard;
use crate::model::transition::Transition;
use crate::options::{Aggressiveness, Options};
use crate::progress::{report_negatives, Phase, PhaseTimer};
use crate::state::StateVector;
use effects::{AccessSummary, EffectSummary};
use indexmap::IndexMap;
use predicate::{jointly_satisfiable, tautology, Dnf, Extractor};
use spins_ast::Expr;
use tracing::debug;

struct Walk<'a> {
    sv: &'a StateVector,
    transitions: &'a [Transition],
    labels: &'a LabelTable,
    deps: &'a Dependencies,
    pos: Vec<Dnf>,
    neg: Vec<Dnf>,
    /// Per group: the conjunction of its guard labels.
    enabled: Vec<Dnf>,
    timeout: Vec<bool>,
    /// Labels that alone guard a group taking part in the deadlock
    /// condition.
    sole: Vec<bool>,
    sharpen: bool,
    joint: bool,
}

pub(crate) fn build_guard_info(
    sv: &StateVector,
    transitions: &[Transition],
    labels: LabelTable,
    deps: &Dependencies,
    deadlock: &Guard,
    options: &Options,
) -> BuildResult<GuardInfo> {
    let n = labels.len();
    let groups = transitions.len();
    let timer = PhaseTimer::start(
        Phase::GuardMatrices,
        n * n + n * groups + groups * groups,
        options.progress.as_ref(),
    );
    let walker = Walker::new(sv, deadlock)?;
    let extractor = Extractor::new(sv, options.aggressiveness);

    let pos: Vec<Dnf> = labels.labels().iter().map(|l| extractor.dnf(&l.expr, true)).collect();
    let neg: Vec<Dnf> = labels.labels().iter().map(|l| extractor.dnf(&l.expr, false)).collect();
    let enabled = transitions
        .iter()
        .map(|t| {
            labels
                .guards_of(t.group)
                .iter()
                .fold(tautology(), |acc, &g| extractor.conjoin(&acc, &pos[g]))
        })
        .collect();
    let mut sole = vec![false; n];
    for t in transitions.iter().filter(|t| !t.timeout && !t.buchi) {
        if let [only] = labels.guards_of(t.group) {
            sole[*only] = true;
        }
    }
    let walk = Walk {
        sv,
        transitions,
        labels: &labels,
        deps,
        timeout: labels.labels().iter().map(|l| l.expr == Expr::Timeout).collect(),
        pos,
        neg,
        enabled,
        sole,
        sharpen: options.must_write || options.aggressiveness == Aggressiveness::Highest,
        joint: options.aggressiveness == Aggressiveness::Highest,
    };
    let unsat = walk.pos.iter().filter(|d| d.is_empty()).count();
    debug!(labels = n, unsat, "predicates extracted");

    let (co, ico, mcd) = walk.pairs(&timer);
    let own = transitions
        .iter()
        .map(|t| EffectSummary::of(t, sv, &walker))
        .collect::<BuildResult<Vec<_>>>()?;
    let summaries = with_follow_ups(transitions, &own, EffectSummary::absorb);
    let sets = walk.sets(&co, &ico, &summaries, &timer);
    let own = transitions
        .iter()
        .map(|t| AccessSummary::of(t, sv, &walker))
        .collect::<BuildResult<Vec<_>>>()?;
    let accesses = with_follow_ups(transitions, &own, AccessSummary::absorb);
    let extra = walk.derived(&co, &sets, &summaries, &accesses, &timer);

    let guards = labels.guard_count();
    report_negatives("!MCE guards", count_zeros(&co, guards), guards * guards);
    report_negatives("!MCE labels", co.zeros(), n * n);
    report_negatives("!MCD labels", mcd.zeros(), n * n);
    report_negatives("!NES", sets.nes.zeros(), n * groups);
    report_negatives("!NDS", sets.nds.zeros(), n * groups);
    report_negatives("!visibility", sets.visibility.zeros(), n * groups);
    timer.finish();

    Ok(GuardInfo {
        labels,
        co_enabled: co,
        co_disabled: mcd,
        nes: sets.nes,
        nds: sets.nds,
        visibility: sets.visibility,
        extra,
    })
}

/// Summaries of whole atomic steps: each group together with the groups
/// that may continue it before priority is released.
fn with_follow_ups<S: Clone>(transitions: &[Transition], own: &[S], absorb: impl Fn(&mut S, &S)) -> Vec<S> {
    transitions
        .iter()
        .zip(own)
        .map(|(t, mine)| {
            let mut step = mine.clone();
            for &f in &t.follow_ups {
                if let Some(next) = own.get(f) {
                    absorb(&mut step, next);
                }
            }
            step
        })
        .collect()
}

/// Zeros within the leading `k x k` block.
fn count_zeros(m: &DepMatrix, k: usize) -> usize {
    (0..k).map(|a| (0..k).filter(|&b| !m.get(a, b)).count()).sum()
}

struct Sets {
    nes: DepMatrix,
    nds: DepMatrix,
    visibility: DepMatrix,
    t2g: DepMatrix,
}

impl Walk<'_> {
    /// Co-enabled (pos/pos), negative-positive and co-disabled (neg/neg)
    /// label pairs.
    fn pairs(&self, timer: &PhaseTimer) -> (DepMatrix, DepMatrix, DepMatrix) {
        let n = self.pos.len();
        let mut co = DepMatrix::new(n, n);
        let mut ico = DepMatrix::new(n, n);
        let mut mcd = DepMatrix::new(n, n);
        for a in 0..n {
            for b in 0..n {
                if b >= a {
                    let excluded = (self.timeout[a] && self.sole[b]) || (self.timeout[b] && self.sole[a]);
                    if !excluded && jointly_satisfiable(&self.pos[a], &self.pos[b], self.sv) {
                        co.set(a, b);
                        co.set(b, a);
                    }
                    if jointly_satisfiable(&self.neg[a], &self.neg[b], self.sv) {
                        mcd.set(a, b);
                        mcd.set(b, a);
                    }
                }
                if jointly_satisfiable(&self.neg[a], &self.pos[b], self.sv) {
                    ico.set(a, b);
                }
            }
            timer.advance(n);
        }
        (co, ico, mcd)
    }

    fn sets(
        &self,
        co: &DepMatrix,
        ico: &DepMatrix,
        summaries: &[EffectSummary],
        timer: &PhaseTimer,
    ) -> Sets {
        let n = self.pos.len();
        let groups = self.transitions.len();
        let mut nes = DepMatrix::new(n, groups);
        let mut nds = DepMatrix::new(n, groups);
        let mut t2g = DepMatrix::new(groups, n);
        for l in 0..n {
            let reads = self.deps.labels.read.row(l);
            for t in self.transitions {
                let g = t.group;
                if !self.deps.actions.may_write.row(g).intersects(reads) {
                    continue;
                }
                t2g.set(g, l);
                if self.enables(l, t, ico, &summaries[g]) {
                    nes.set(l, g);
                }
                if self.disables(l, t, co, &summaries[g]) {
                    nds.set(l, g);
                }
            }
            timer.advance(groups);
        }
        let mut visibility = nes.clone();
        for l in 0..n {
            visibility.or_row(l, nds.row(l));
        }
        Sets {
            nes,
            nds,
            visibility,
            t2g,
        }
    }

    /// `t` may fire while `l` is false and leave `l` true.
    fn enables(&self, l: usize, t: &Transition, ico: &DepMatrix, summary: &EffectSummary) -> bool {
        let own = self.labels.guards_of(t.group);
        if !own.iter().all(|&x| ico.get(l, x)) {
            return false;
        }
        if self.joint && !jointly_satisfiable(&self.neg[l], &self.enabled[t.group], self.sv) {
            return false;
        }
        !self.sharpen || summary.may_satisfy(&self.pos[l])
    }

    /// `t` may fire while `l` is true and leave `l` false.
    fn disables(&self, l: usize, t: &Transition, co: &DepMatrix, summary: &EffectSummary) -> bool {
        if self.timeout[l] {
            // no other group fires while timeout holds
            return t.timeout || t.buchi;
        }
        let own = self.labels.guards_of(t.group);
        if !own.iter().all(|&x| co.get(l, x)) {
            return false;
        }
        if self.joint && !jointly_satisfiable(&self.pos[l], &self.enabled[t.group], self.sv) {
            return false;
        }
        !self.sharpen || summary.may_satisfy(&self.neg[l])
    }

    fn derived(
        &self,
        co: &DepMatrix,
        sets: &Sets,
        summaries: &[EffectSummary],
        accesses: &[AccessSummary],
        timer: &PhaseTimer,
    ) -> IndexMap<String, DepMatrix> {
        let n = self.pos.len();
        let groups = self.transitions.len();
        let slots = self.sv.len();
        let label_reads = &self.deps.labels.read;

        let mut g2g = DepMatrix::new(n, n);
        for a in 0..n {
            for b in 0..n {
                if label_reads.row(a).intersects(label_reads.row(b)) {
                    g2g.set(a, b);
                }
            }
        }

        let mut mes = DepMatrix::new(n, groups);
        let mut mds = DepMatrix::new(n, groups);
        for l in 0..n {
            for (g, summary) in summaries.iter().enumerate() {
                if summary.must_satisfy(&self.pos[l]) {
                    mes.set(l, g);
                }
                if summary.must_satisfy(&self.neg[l]) {
                    mds.set(l, g);
                }
            }
        }

        let guard_reads: Vec<DepRow> = self
            .transitions
            .iter()
            .map(|t| {
                let mut row = DepRow::new(slots);
                for g in std::iter::once(t.group).chain(t.follow_ups.iter().copied()) {
                    for &l in self.labels.guards_of(g) {
                        row.or_with(label_reads.row(l));
                    }
                }
                row
            })
            .collect();

        let mut t2t = DepMatrix::new(groups, groups);
        let mut mct = DepMatrix::new(groups, groups);
        let mut net = DepMatrix::new(groups, groups);
        let mut ndt = DepMatrix::new(groups, groups);
        let mut commutes = DepMatrix::new(groups, groups);
        for a in 0..groups {
            let writes = self.deps.actions.may_write.row(a);
            for b in 0..groups {
                if writes.intersects(&self.deps.full.touched(b)) {
                    t2t.set(a, b);
                }
                if self.maybe_co_enabled(a, b, co) {
                    mct.set(a, b);
                }
                let guards_b = self.labels.guards_of(b);
                if guards_b.iter().any(|&l| sets.nes.get(l, a)) {
                    net.set(a, b);
                }
                if guards_b.iter().any(|&l| sets.nds.get(l, a)) {
                    ndt.set(a, b);
                }
                if self.commute(a, b, accesses, &guard_reads) {
                    commutes.set(a, b);
                }
            }
            timer.advance(groups);
        }

        let mut dna = DepMatrix::new(groups, groups);
        for a in 0..groups {
            for b in 0..groups {
                let dependent = t2t.get(a, b) || t2t.get(b, a);
                if mct.get(a, b) && dependent && !commutes.get(a, b) {
                    dna.set(a, b);
                }
            }
        }

        let mut extra = IndexMap::new();
        extra.insert("g2g".to_string(), g2g);
        extra.insert("t2g".to_string(), sets.t2g.clone());
        extra.insert("t2t".to_string(), t2t);
        extra.insert("mct".to_string(), mct);
        extra.insert("net".to_string(), net);
        extra.insert("ndt".to_string(), ndt);
        extra.insert("mes".to_string(), mes);
        extra.insert("mds".to_string(), mds);
        extra.insert("dna".to_string(), dna);
        extra.insert("commutes".to_string(), commutes);
        extra
    }

    fn maybe_co_enabled(&self, a: usize, b: usize, co: &DepMatrix) -> bool {
        let (la, lb) = (self.labels.guards_of(a), self.labels.guards_of(b));
        let pairwise = la.iter().all(|&x| lb.iter().all(|&y| co.get(x, y)));
        if !pairwise {
            return false;
        }
        !self.joint || jointly_satisfiable(&self.enabled[a], &self.enabled[b], self.sv)
    }

    /// In a state where both are enabled, `a` and `b` reach the same state
    /// in either order and neither changes the other's guard.
    fn commute(&self, a: usize, b: usize, accesses: &[AccessSummary], guard_reads: &[DepRow]) -> bool {
        let deps = &self.deps;
        let (ta, tb) = (deps.full.touched(a), deps.full.touched(b));
        for s in ta.ones().filter(|&s| tb.get(s)) {
            if !deps.actions.may_write.get(a, s) && !deps.actions.may_write.get(b, s) {
                continue;
            }
            let (Some(x), Some(y)) = (accesses[a].get(s), accesses[b].get(s)) else {
                return false;
            };
            if !x.commutes_with(y) {
                return false;
            }
            if (guard_reads[a].get(s) || guard_reads[b].get(s)) && !x.is_channel() {
                return false;
            }
        }
        true
    }
}
