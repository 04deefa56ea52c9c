//! Simple predicates and their extraction from guard expressions.
//!
//! A guard is over-approximated by a disjunction of conjunctions of simple
//! predicates `reference op constant`. Every conjunction is implied by its
//! disjunct; sub-expressions that cannot be reduced contribute nothing.
//! Satisfiability of a conjunction is decided per reference with interval
//! reasoning.

use crate::options::Aggressiveness;
use crate::state::{Layout, StateVector};
use spins_ast::{ChanOp, CmpOp, Expr, Identifier, LogicOp, UnaryOp};
use std::collections::{BTreeSet, HashMap};

/// What a simple predicate constrains.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Reference {
    Slot(usize),
    /// An identifier with a non-constant index. Only comparable within one
    /// state.
    Symbolic(Identifier),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SimplePredicate {
    pub reference: Reference,
    pub op: CmpOp,
    pub constant: i64,
}

impl SimplePredicate {
    fn slot(slot: usize, op: CmpOp, constant: i64) -> Self {
        Self {
            reference: Reference::Slot(slot),
            op,
            constant,
        }
    }

    pub(crate) fn holds_for(&self, value: i64) -> bool {
        holds(self.op, value, self.constant)
    }
}

pub(crate) fn holds(op: CmpOp, value: i64, constant: i64) -> bool {
    match op {
        CmpOp::Lt => value < constant,
        CmpOp::Le => value <= constant,
        CmpOp::Eq => value == constant,
        CmpOp::Ne => value != constant,
        CmpOp::Gt => value > constant,
        CmpOp::Ge => value >= constant,
    }
}

/// A conjunction of predicates implied by one disjunct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Conjunct {
    pub preds: Vec<SimplePredicate>,
    /// The predicates are equivalent to the disjunct, not only implied.
    pub complete: bool,
}

impl Conjunct {
    /// Nothing known.
    fn opaque() -> Self {
        Self {
            preds: Vec::new(),
            complete: false,
        }
    }

    fn top() -> Self {
        Self {
            preds: Vec::new(),
            complete: true,
        }
    }

    fn single(pred: SimplePredicate) -> Self {
        Self {
            preds: vec![pred],
            complete: true,
        }
    }
}

/// Disjunctive normal form. Empty means unsatisfiable.
pub(crate) type Dnf = Vec<Conjunct>;

/// The DNF of `true`.
pub(crate) fn tautology() -> Dnf {
    vec![Conjunct::top()]
}

/// The values a reference may still take.
#[derive(Debug, Clone)]
struct Domain {
    lo: i64,
    hi: i64,
    holes: BTreeSet<i64>,
}

impl Domain {
    fn new((lo, hi): (i64, i64)) -> Self {
        Self {
            lo,
            hi,
            holes: BTreeSet::new(),
        }
    }

    fn restrict(&mut self, op: CmpOp, c: i64) {
        match op {
            CmpOp::Lt => self.hi = self.hi.min(c.saturating_sub(1)),
            CmpOp::Le => self.hi = self.hi.min(c),
            CmpOp::Gt => self.lo = self.lo.max(c.saturating_add(1)),
            CmpOp::Ge => self.lo = self.lo.max(c),
            CmpOp::Eq => {
                self.lo = self.lo.max(c);
                self.hi = self.hi.min(c);
            }
            CmpOp::Ne => {
                self.holes.insert(c);
            }
        }
    }

    fn is_empty(&self) -> bool {
        if self.lo > self.hi {
            return true;
        }
        let width = i128::from(self.hi) - i128::from(self.lo) + 1;
        let punctured = self.holes.range(self.lo..=self.hi).count() as i128;
        punctured >= width
    }
}

/// Whether the predicates can hold together.
pub(crate) fn satisfiable<'p>(
    preds: impl IntoIterator<Item = &'p SimplePredicate>,
    sv: &StateVector,
) -> bool {
    let mut domains: HashMap<&Reference, Domain> = HashMap::new();
    for p in preds {
        let domain = domains
            .entry(&p.reference)
            .or_insert_with(|| Domain::new(bounds(&p.reference, sv)));
        domain.restrict(p.op, p.constant);
        if domain.is_empty() {
            return false;
        }
    }
    true
}

fn bounds(reference: &Reference, sv: &StateVector) -> (i64, i64) {
    match reference {
        Reference::Slot(s) => sv.slot(*s).ty.bounds(),
        Reference::Symbolic(_) => (i64::from(i32::MIN), i64::from(i32::MAX)),
    }
}

/// Whether some disjunct of `a` can hold together with some disjunct of
/// `b`.
pub(crate) fn jointly_satisfiable(a: &Dnf, b: &Dnf, sv: &StateVector) -> bool {
    a.iter().any(|x| {
        b.iter()
            .any(|y| satisfiable(x.preds.iter().chain(&y.preds), sv))
    })
}

/// Extracts simple predicates at a given aggressiveness.
pub(crate) struct Extractor<'a> {
    sv: &'a StateVector,
    level: Aggressiveness,
    max_disjuncts: usize,
}

impl<'a> Extractor<'a> {
    pub(crate) fn new(sv: &'a StateVector, level: Aggressiveness) -> Self {
        let max_disjuncts = match level {
            Aggressiveness::Weak => 2,
            Aggressiveness::Normal => 8,
            Aggressiveness::High => 16,
            Aggressiveness::Highest => 32,
        };
        Self {
            sv,
            level,
            max_disjuncts,
        }
    }

    /// The DNF of `e` when `positive`, of its negation otherwise.
    pub(crate) fn dnf(&self, e: &Expr, positive: bool) -> Dnf {
        match e {
            Expr::Logic { op, left, right } => {
                let l = self.dnf(left, positive);
                let r = self.dnf(right, positive);
                match (op, positive) {
                    (LogicOp::And, true) | (LogicOp::Or, false) => self.conjoin(&l, &r),
                    (LogicOp::Or, true) | (LogicOp::And, false) => self.concat(l, r),
                }
            }
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => self.dnf(expr, !positive),
            Expr::Eval { expr } => self.dnf(expr, positive),
            _ => self.leaf(e, positive),
        }
    }

    /// Conjunction of two DNFs, dropping unsatisfiable products.
    pub(crate) fn conjoin(&self, a: &Dnf, b: &Dnf) -> Dnf {
        if a.len() * b.len() > self.max_disjuncts {
            // too wide: keep only what every disjunct of one side implies
            return vec![Conjunct::opaque()];
        }
        let mut out = Vec::with_capacity(a.len() * b.len());
        for x in a {
            for y in b {
                let mut preds = x.preds.clone();
                preds.extend(y.preds.iter().cloned());
                if satisfiable(&preds, self.sv) {
                    out.push(Conjunct {
                        preds,
                        complete: x.complete && y.complete,
                    });
                }
            }
        }
        out
    }

    fn concat(&self, mut a: Dnf, b: Dnf) -> Dnf {
        a.extend(b);
        if a.len() > self.max_disjuncts {
            return vec![Conjunct::opaque()];
        }
        a
    }

    fn leaf(&self, e: &Expr, positive: bool) -> Dnf {
        if let Some(v) = self.constant(e) {
            return if (v != 0) == positive {
                vec![Conjunct::top()]
            } else {
                Vec::new()
            };
        }
        match e {
            Expr::Compare { op, left, right } => {
                let op = if positive { *op } else { op.negate() };
                if let (Some(r), Some(c)) = (self.reference(left), self.constant(right)) {
                    return vec![pred(r, op, c)];
                }
                match (self.constant(left), self.reference(right)) {
                    (Some(c), Some(r)) => vec![pred(r, op.mirror(), c)],
                    _ => vec![Conjunct::opaque()],
                }
            }
            Expr::ChanOp { op, chan } if self.level >= Aggressiveness::High => {
                let Some((fill, capacity)) = self.channel(chan) else {
                    return vec![Conjunct::opaque()];
                };
                let (cmp, c) = match op {
                    ChanOp::Empty => (CmpOp::Eq, 0),
                    ChanOp::NotEmpty => (CmpOp::Gt, 0),
                    ChanOp::Full => (CmpOp::Ge, capacity),
                    ChanOp::NotFull => (CmpOp::Lt, capacity),
                };
                let cmp = if positive { cmp } else { cmp.negate() };
                vec![Conjunct::single(SimplePredicate::slot(fill, cmp, c))]
            }
            Expr::ChanPoll { chan, args, random } if self.level >= Aggressiveness::High => {
                self.poll(chan, args, *random, positive)
            }
            Expr::RemoteRef { process, state, .. } if self.level >= Aggressiveness::High => {
                match self.sv.scalar_slot(self.sv.pc(*process)) {
                    Some(pc) => {
                        let op = if positive { CmpOp::Eq } else { CmpOp::Ne };
                        vec![Conjunct::single(SimplePredicate::slot(pc, op, state.0 as i64))]
                    }
                    None => vec![Conjunct::opaque()],
                }
            }
            other => match self.reference(other) {
                Some(r) => {
                    let op = if positive { CmpOp::Ne } else { CmpOp::Eq };
                    vec![pred(r, op, 0)]
                }
                None => vec![Conjunct::opaque()],
            },
        }
    }

    /// `c?[args]`: a message is buffered and the head matches the constant
    /// arguments.
    fn poll(&self, chan: &Identifier, args: &[Expr], random: bool, positive: bool) -> Dnf {
        let Some((fill, _)) = self.channel(chan) else {
            return vec![Conjunct::opaque()];
        };
        let mut head = Vec::new();
        let mut complete = !random;
        if !random {
            for (m, arg) in args.iter().enumerate() {
                match self.constant(arg) {
                    Some(c) => match self.sv.resolve(&chan.buffer(Expr::constant(0), m)) {
                        Ok(r) if r.exact => head.push(SimplePredicate::slot(r.slots[0], CmpOp::Eq, c)),
                        _ => complete = false,
                    },
                    None if matches!(arg, Expr::Ident(_)) => {}
                    None => complete = false,
                }
            }
        }
        let buffered = SimplePredicate::slot(fill, CmpOp::Gt, 0);
        if positive {
            let mut preds = vec![buffered];
            preds.extend(head);
            return vec![Conjunct { preds, complete }];
        }
        if !complete {
            return vec![Conjunct::opaque()];
        }
        let mut out = vec![Conjunct::single(SimplePredicate::slot(fill, CmpOp::Eq, 0))];
        for p in head {
            out.push(Conjunct::single(SimplePredicate {
                op: p.op.negate(),
                ..p
            }));
        }
        if out.len() > self.max_disjuncts {
            return vec![Conjunct::opaque()];
        }
        out
    }

    /// Fill slot and capacity of a buffered channel selected by constant
    /// indices.
    fn channel(&self, chan: &Identifier) -> Option<(usize, i64)> {
        if !chan.is_constant_path() {
            return None;
        }
        let fill = self.sv.resolve(&chan.fill()).ok()?;
        if !fill.exact {
            return None;
        }
        let capacity = match self.sv.layout(chan.var)? {
            Layout::Channel { rows, .. } if chan.is_plain() => rows.len(),
            _ => {
                let last = self.sv.resolve(&chan.buffer(Expr::var(chan.var), 0)).ok()?;
                last.slots.len()
            }
        };
        Some((fill.slots[0], capacity as i64))
    }

    fn constant(&self, e: &Expr) -> Option<i64> {
        match (self.level, e) {
            (_, Expr::Const { value }) => Some(i64::from(*value)),
            (Aggressiveness::Weak, _) => None,
            _ => e.constant_value().map(i64::from),
        }
    }

    fn reference(&self, e: &Expr) -> Option<Reference> {
        match e {
            Expr::Ident(id) if id.is_plain() => self.sv.scalar_slot(id.var).map(Reference::Slot),
            _ if self.level == Aggressiveness::Weak => None,
            Expr::Ident(id) => {
                let r = self.sv.resolve(id).ok()?;
                if !r.leaf || r.slots.is_empty() {
                    return None;
                }
                if r.exact {
                    Some(Reference::Slot(r.slots[0]))
                } else if id.is_constant_path() {
                    None
                } else {
                    Some(Reference::Symbolic(id.clone()))
                }
            }
            Expr::ChanLen { chan } => self.channel(chan).map(|(fill, _)| Reference::Slot(fill)),
            _ => None,
        }
    }
}

fn pred(reference: Reference, op: CmpOp, constant: i64) -> Conjunct {
    Conjunct::single(SimplePredicate {
        reference,
        op,
        constant,
    })
}
