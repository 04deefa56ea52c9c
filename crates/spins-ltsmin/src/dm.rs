//! Read, may-write and must-write dependencies of labels and groups.
//!
//! Every identifier is resolved to the slots it may denote. A write is a
//! must-write only when it always happens and resolves to exactly one slot;
//! everything else is a may-write. Label rows are computed once and OR-ed
//! into the rows of the groups guarded by them.

use crate::error::BuildResult;
use crate::guard_info::LabelTable;
use crate::matrix::{DepRow, RWMatrix};
use crate::model::guard::Guard;
use crate::model::transition::{Effect, Transition};
use crate::options::Options;
use crate::progress::{Phase, PhaseTimer};
use crate::state::StateVector;
use spins_ast::{Action, AssignOp, Expr, Identifier, Member, RunExpr};
use tracing::info;

/// The dependency matrices of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependencies {
    /// Reads of every label (labels x slots). Labels never write.
    pub labels: RWMatrix,
    /// Effects only (groups x slots).
    pub actions: RWMatrix,
    /// Guards and effects (groups x slots).
    pub full: RWMatrix,
}

/// Marks of one row.
#[derive(Debug, Clone)]
pub(crate) struct Marks {
    pub read: DepRow,
    pub may: DepRow,
    pub must: DepRow,
}

impl Marks {
    pub(crate) fn new(slots: usize) -> Self {
        Self {
            read: DepRow::new(slots),
            may: DepRow::new(slots),
            must: DepRow::new(slots),
        }
    }

    fn read_all(&mut self, slots: impl IntoIterator<Item = usize>) {
        slots.into_iter().for_each(|s| self.read.set(s));
    }
}

/// Walks expressions and effects, marking the slots they touch.
pub(crate) struct Walker<'a> {
    sv: &'a StateVector,
    /// Reads of the deadlock condition; `timeout` reads all of them.
    timeout_reads: DepRow,
}

impl<'a> Walker<'a> {
    pub(crate) fn new(sv: &'a StateVector, deadlock: &Guard) -> BuildResult<Self> {
        let mut walker = Walker {
            sv,
            timeout_reads: DepRow::new(sv.len()),
        };
        let mut marks = Marks::new(sv.len());
        walker.guard(deadlock, &mut marks)?;
        walker.timeout_reads = marks.read;
        Ok(walker)
    }

    pub(crate) fn guard(&self, g: &Guard, marks: &mut Marks) -> BuildResult<()> {
        match g {
            Guard::Expr(e) => self.expr(e, marks),
            Guard::And(gs) | Guard::Or(gs) | Guard::Nand(gs) => gs.iter().try_for_each(|g| self.guard(g, marks)),
        }
    }

    pub(crate) fn expr(&self, e: &Expr, marks: &mut Marks) -> BuildResult<()> {
        match e {
            Expr::Const { .. } | Expr::Mtype { .. } => Ok(()),
            Expr::Ident(id) => self.read(id, marks),
            Expr::Unary { expr, .. } | Expr::Eval { expr } => self.expr(expr, marks),
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logic { left, right, .. } => {
                self.expr(left, marks)?;
                self.expr(right, marks)
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, marks)?;
                self.expr(then, marks)?;
                self.expr(otherwise, marks)
            }
            Expr::ChanLen { chan } | Expr::ChanOp { chan, .. } => self.read(&chan.fill(), marks),
            Expr::ChanPoll { chan, args, random } => {
                self.read(&chan.fill(), marks)?;
                for (m, arg) in args.iter().enumerate() {
                    marks.read_all(self.rows(chan, m, !random)?);
                    self.expr(arg, marks)?;
                }
                Ok(())
            }
            Expr::RemoteRef { process, .. } => {
                if let Some(slot) = self.sv.scalar_slot(self.sv.pc(*process)) {
                    marks.read.set(slot);
                }
                Ok(())
            }
            Expr::Timeout => {
                marks.read.or_with(&self.timeout_reads);
                Ok(())
            }
            Expr::Run(run) => {
                self.counter(marks, false, false);
                for &target in &run.targets {
                    if let Some(slot) = self.sv.scalar_slot(self.sv.pc(target)) {
                        marks.read.set(slot);
                    }
                }
                run.args.iter().try_for_each(|a| self.expr(a, marks))
            }
        }
    }

    /// Reads of the slots `id` denotes and of its index expressions.
    fn read(&self, id: &Identifier, marks: &mut Marks) -> BuildResult<()> {
        let r = self.sv.resolve(id)?;
        marks.read_all(r.slots);
        self.index_reads(id, marks)
    }

    /// A write to `id`. It is a must-write when `strict` and `id` denotes a
    /// single slot.
    fn write(&self, id: &Identifier, marks: &mut Marks, strict: bool) -> BuildResult<()> {
        let r = self.sv.resolve_write(id)?;
        let must = strict && r.exact;
        for s in r.slots {
            marks.may.set(s);
            if must {
                marks.must.set(s);
            }
        }
        self.index_reads(id, marks)
    }

    fn index_reads(&self, id: &Identifier, marks: &mut Marks) -> BuildResult<()> {
        if let Some(index) = &id.index {
            self.expr(index, marks)?;
        }
        let mut member = id.member.as_deref();
        while let Some(m) = member {
            member = match m {
                Member::Field { index, member, .. } => {
                    if let Some(index) = index {
                        self.expr(index, marks)?;
                    }
                    member.as_deref()
                }
                Member::Fill => None,
                Member::Buffer { row, .. } => {
                    self.expr(row, marks)?;
                    None
                }
            };
        }
        Ok(())
    }

    /// Field `m` of the head row, or of every row.
    fn rows(&self, chan: &Identifier, m: usize, head_only: bool) -> BuildResult<Vec<usize>> {
        // any non-constant row selects all of them
        let row = if head_only { Expr::constant(0) } else { Expr::var(chan.var) };
        Ok(self.sv.resolve(&chan.buffer(row, m))?.slots.into_vec())
    }

    fn counter(&self, marks: &mut Marks, write: bool, strict: bool) {
        let Some(slot) = self.sv.nr_pr().and_then(|nr| self.sv.scalar_slot(nr)) else {
            return;
        };
        marks.read.set(slot);
        if write {
            marks.may.set(slot);
            if strict {
                marks.must.set(slot);
            }
        }
    }

    pub(crate) fn effect(&self, effect: &Effect, marks: &mut Marks) -> BuildResult<()> {
        match effect {
            Effect::Action(a) => self.action(a, marks, true),
            Effect::Reset(p) => {
                for s in self.sv.process_slots(*p) {
                    marks.may.set(s);
                    marks.must.set(s);
                }
                self.counter(marks, true, false);
                Ok(())
            }
        }
    }

    pub(crate) fn action(&self, action: &Action, marks: &mut Marks, strict: bool) -> BuildResult<()> {
        match action {
            Action::Assign {
                target,
                op: AssignOp::Set,
                value,
                ..
            } => {
                self.expr(value, marks)?;
                self.write(target, marks, strict)
            }
            Action::Assign { target, .. } => {
                self.read(target, marks)?;
                self.write(target, marks, strict)
            }
            Action::Assert { expr, .. } => self.expr(expr, marks),
            Action::Print { args, .. } => args.iter().try_for_each(|a| self.expr(a, marks)),
            Action::Expr { expr, .. } => {
                self.expr(expr, marks)?;
                let mut runs = Vec::new();
                expr.visit(&mut |e| {
                    if let Expr::Run(run) = e {
                        runs.push(run.clone());
                    }
                });
                runs.iter().try_for_each(|run| self.run(run, marks, strict))
            }
            Action::Send { chan, args, .. } => {
                self.read(&chan.fill(), marks)?;
                self.write(&chan.fill(), marks, strict)?;
                for (m, arg) in args.iter().enumerate() {
                    for s in self.rows(chan, m, false)? {
                        marks.may.set(s);
                    }
                    self.expr(arg, marks)?;
                }
                Ok(())
            }
            Action::Receive {
                chan,
                args,
                poll,
                random,
                ..
            } => {
                self.read(&chan.fill(), marks)?;
                for (m, arg) in args.iter().enumerate() {
                    marks.read_all(self.rows(chan, m, !random)?);
                    match arg {
                        Expr::Ident(id) => self.write(id, marks, strict)?,
                        other => self.expr(other, marks)?,
                    }
                }
                if !poll {
                    self.write(&chan.fill(), marks, strict)?;
                    // the remaining messages shift towards the head
                    for m in 0..args.len() {
                        for s in self.rows(chan, m, false)? {
                            marks.read.set(s);
                            marks.may.set(s);
                        }
                    }
                }
                Ok(())
            }
            Action::Options { options, .. } => {
                for branch in options {
                    for a in branch {
                        self.action(a, marks, false)?;
                    }
                }
                Ok(())
            }
            Action::Break { .. } | Action::Else { .. } | Action::Goto { .. } | Action::Label { .. } => Ok(()),
        }
    }

    fn run(&self, run: &RunExpr, marks: &mut Marks, strict: bool) -> BuildResult<()> {
        let single = strict && run.targets.len() == 1;
        self.counter(marks, true, strict);
        for &target in &run.targets {
            for var in [self.sv.pc(target), self.sv.pid(target)] {
                self.write(&Identifier::new(var), marks, single)?;
            }
        }
        for init in &run.inits {
            self.expr(&init.value, marks)?;
            self.write(&init.target, marks, single)?;
        }
        Ok(())
    }
}

/// Compute the label, action and full dependency matrices.
pub(crate) fn build_dependencies(
    sv: &StateVector,
    transitions: &[Transition],
    labels: &LabelTable,
    deadlock: &Guard,
    options: &Options,
) -> BuildResult<Dependencies> {
    let slots = sv.len();
    let timer = PhaseTimer::start(
        Phase::Dependencies,
        labels.len() + transitions.len(),
        options.progress.as_ref(),
    );
    let walker = Walker::new(sv, deadlock)?;

    let mut label_deps = RWMatrix::new(labels.len(), slots);
    for (l, label) in labels.labels().iter().enumerate() {
        let mut marks = Marks::new(slots);
        walker.expr(&label.expr, &mut marks)?;
        label_deps.read.or_row(l, &marks.read);
        timer.advance(1);
    }

    let mut own = Vec::with_capacity(transitions.len());
    for t in transitions {
        let mut marks = Marks::new(slots);
        for effect in &t.effects {
            walker.effect(effect, &mut marks)?;
        }
        own.push(marks);
    }

    let mut actions = RWMatrix::new(transitions.len(), slots);
    let mut full = RWMatrix::new(transitions.len(), slots);
    for t in transitions {
        let g = t.group;
        let mine = &own[g];
        actions.read.or_row(g, &mine.read);
        actions.may_write.or_row(g, &mine.may);
        actions.must_write.or_row(g, &mine.must);
        for &l in labels.guards_of(g) {
            full.read.or_row(g, label_deps.read.row(l));
        }
        for &f in &t.follow_ups {
            let next = &own[f];
            actions.read.or_row(g, &next.read);
            actions.may_write.or_row(g, &next.may);
            for &l in labels.guards_of(f) {
                full.read.or_row(g, label_deps.read.row(l));
            }
        }
        full.read.or_row(g, actions.read.row(g));
        full.may_write.or_row(g, actions.may_write.row(g));
        full.must_write.or_row(g, actions.must_write.row(g));
        timer.advance(1);
    }

    info!(
        read = full.read.count(),
        may_write = full.may_write.count(),
        must_write = full.must_write.count(),
        cells = transitions.len() * slots,
        "dependency matrix"
    );
    timer.finish();
    Ok(Dependencies {
        labels: label_deps,
        actions,
        full,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_transitions;
    use spins_ast::{ScalarType, SpecBuilder, Specification, VarType, Variable};

    struct Fixture {
        sv: StateVector,
        transitions: Vec<Transition>,
        deps: Dependencies,
    }

    fn deps(spec: &Specification) -> Fixture {
        let mut vars = spec.variables.clone();
        let sv = StateVector::build(spec, &mut vars).unwrap();
        let options = Options::default();
        let built = build_transitions(spec, &vars, &sv, &options).unwrap();
        let labels = LabelTable::build(spec, &vars, &sv, &built.transitions, &built.never_accepting, false);
        let deps = build_dependencies(&sv, &built.transitions, &labels, &built.deadlock, &options).unwrap();
        Fixture {
            sv,
            transitions: built.transitions,
            deps,
        }
    }

    /// Group of the first transition executing an action.
    fn acting(f: &Fixture) -> usize {
        f.transitions.iter().find(|t| t.actions().next().is_some()).unwrap().group
    }

    fn slot(sv: &StateVector, name: &str) -> usize {
        sv.slots().iter().position(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_assignment_is_must_write() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.global(Variable::new("y", VarType::int()));
        b.process("A", |p| {
            p.sequence(vec![Action::assign(Identifier::new(x), Expr::constant(1))]);
        });
        let f = deps(&b.build());
        let (x, y) = (slot(&f.sv, "x"), slot(&f.sv, "y"));
        let t = acting(&f);
        assert!(f.deps.full.must_write.get(t, x));
        assert!(!f.deps.full.read.get(t, y));
        assert!(!f.deps.full.may_write.get(t, y));
    }

    #[test]
    fn test_indexed_write_fans_out_as_may_write() {
        let mut b = SpecBuilder::new();
        let i = b.global(Variable::new("i", VarType::byte()));
        let a = b.global(Variable::new("a", VarType::int()).with_array(2));
        b.process("A", |p| {
            p.sequence(vec![Action::assign(Identifier::indexed(a, Expr::var(i)), Expr::constant(1))]);
        });
        let f = deps(&b.build());
        let t = acting(&f);
        for name in ["a[0]", "a[1]"] {
            let s = slot(&f.sv, name);
            assert!(f.deps.full.may_write.get(t, s));
            assert!(!f.deps.full.must_write.get(t, s));
        }
        assert!(f.deps.full.read.get(t, slot(&f.sv, "i")));
    }

    #[test]
    fn test_send_writes_rows_maybe() {
        let mut b = SpecBuilder::new();
        let c = b.global(Variable::new("c", VarType::channel(2, vec![ScalarType::Byte])));
        b.process("P", |p| {
            p.sequence(vec![Action::send(Identifier::new(c), vec![Expr::constant(5)])]);
        });
        let f = deps(&b.build());
        let t = acting(&f);
        let fill = slot(&f.sv, "c.fill");
        assert!(f.deps.full.read.get(t, fill));
        assert!(f.deps.full.must_write.get(t, fill));
        for name in ["c.buf[0].m0", "c.buf[1].m0"] {
            let s = slot(&f.sv, name);
            assert!(f.deps.full.may_write.get(t, s));
            assert!(!f.deps.full.must_write.get(t, s));
        }
    }

    #[test]
    fn test_death_writes_process_range() {
        let mut b = SpecBuilder::new();
        b.process("A", |p| {
            p.local(Variable::new("l", VarType::byte()));
        });
        let f = deps(&b.build());
        let t = f.transitions[0].group;
        for s in f.sv.process_slots(spins_ast::ProcId(0)) {
            assert!(f.deps.actions.must_write.get(t, s));
        }
    }
}
