//! The flat state vector and identifier resolution.
//!
//! Slot order is fixed: the atomicity priority, the live-process counter
//! (only when the specification starts processes with `run`), the globals,
//! the never claim counter, and then per process instance its program
//! counter, its pid, its parameters and its locals. Every slot holds one
//! 32-bit integer.

mod layout;

pub use layout::Layout;

use crate::error::{BuildError, BuildResult};
use layout::{LayoutBuilder, SlotSpec};
use smallvec::SmallVec;
use spins_ast::{Expr, Identifier, Member, ProcId, ScalarType, Span, Specification, VarId, VarType, Variable};
use std::ops::Range;
use tracing::debug;

/// Width of one slot in bytes.
pub const SLOT_BYTES: usize = 4;

/// One element of the state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Fully qualified name, e.g. `P.buf[1]` or `c.buf[0].m1`.
    pub name: String,
    pub var: VarId,
    pub ty: ScalarType,
    /// Array element of `var` this slot belongs to; `None` for non-arrays.
    pub index: Option<usize>,
    /// Owning process instance; `None` for globals and synthesized globals.
    pub process: Option<ProcId>,
    pub offset: usize,
    pub initial: i32,
}

/// The slots an identifier denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    pub slots: SmallVec<[usize; 1]>,
    /// Exactly one slot, selected through constant indices only.
    pub exact: bool,
    /// Every selected node is a scalar, so the reference can be written.
    pub leaf: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    layout: Layout,
    name: String,
    process: String,
}

/// Slot table plus the layout tree of every variable.
#[derive(Debug, Clone)]
pub struct StateVector {
    slots: Vec<Slot>,
    entries: Vec<Entry>,
    priority: VarId,
    nr_pr: Option<VarId>,
    never_pc: Option<VarId>,
    pcs: Vec<VarId>,
    pids: Vec<VarId>,
    process_ranges: Vec<Range<usize>>,
}

impl StateVector {
    /// Synthesize the bookkeeping variables into `variables` (a copy of the
    /// specification's table) and lay everything out.
    pub(crate) fn build(spec: &Specification, variables: &mut Vec<Variable>) -> BuildResult<Self> {
        let declared = variables.len();
        let has_runs = spec_has_runs(spec);

        let synth = |variables: &mut Vec<Variable>, name: &str, owner: Option<ProcId>| {
            let id = VarId(variables.len());
            let mut v = Variable::new(name, VarType::int());
            v.owner = owner;
            variables.push(v);
            id
        };
        let priority = synth(variables, "_priority", None);
        let nr_pr = has_runs.then(|| synth(variables, "_nr_pr", None));
        let never_pc = spec.never.as_ref().map(|_| synth(variables, "_never_pc", None));
        let mut pcs = Vec::with_capacity(spec.processes.len());
        let mut pids = Vec::with_capacity(spec.processes.len());
        for i in 0..spec.processes.len() {
            pcs.push(synth(variables, "_pc", Some(ProcId(i))));
            pids.push(synth(variables, "_pid", Some(ProcId(i))));
        }

        let mut sv = StateVector {
            slots: Vec::new(),
            entries: vec![
                Entry {
                    layout: Layout::Hidden,
                    name: String::new(),
                    process: String::new(),
                };
                variables.len()
            ],
            priority,
            nr_pr,
            never_pc,
            pcs: pcs.clone(),
            pids: pids.clone(),
            process_ranges: Vec::with_capacity(spec.processes.len()),
        };

        let active = spec.processes.iter().filter(|p| p.active).count() as i32;
        sv.place(variables, priority, -1, "-")?;
        if let Some(nr) = nr_pr {
            sv.place(variables, nr, active, "-")?;
        }

        let mut globals: Vec<VarId> = spec.globals.clone();
        for (i, v) in variables.iter().enumerate().take(declared) {
            if v.owner.is_none() && !globals.contains(&VarId(i)) {
                globals.push(VarId(i));
            }
        }
        for g in globals {
            let init = initial_value(variables, g)?;
            sv.place(variables, g, init, "-")?;
        }

        if let (Some(pc), Some(never)) = (never_pc, &spec.never) {
            sv.place(variables, pc, never.automaton.start.0 as i32, &never.name)?;
        }

        for (i, process) in spec.processes.iter().enumerate() {
            let first = sv.slots.len();
            let (pc_init, pid_init) = if process.active {
                (process.automaton.start.0 as i32, i as i32)
            } else {
                (-1, -1)
            };
            sv.place(variables, pcs[i], pc_init, &process.name)?;
            sv.place(variables, pids[i], pid_init, &process.name)?;
            let mut owned: Vec<VarId> = process.params.clone();
            owned.extend(process.locals.iter().copied());
            for (v, var) in variables.iter().enumerate().take(declared) {
                if var.owner == Some(ProcId(i)) && !owned.contains(&VarId(v)) {
                    owned.push(VarId(v));
                }
            }
            for v in owned {
                let init = initial_value(variables, v)?;
                sv.place(variables, v, init, &process.name)?;
            }
            sv.process_ranges.push(first..sv.slots.len());
        }

        debug!(slots = sv.slots.len(), variables = variables.len(), "state vector laid out");
        Ok(sv)
    }

    fn place(&mut self, variables: &[Variable], id: VarId, init: i32, process: &str) -> BuildResult<()> {
        let var = variables.get(id.0).ok_or(BuildError::UnknownVariable {
            var: id.0,
            span: Span::dummy(),
        })?;
        let qualified = match (var.owner, process) {
            (Some(_), p) => format!("{}.{}", p, var.name),
            (None, _) => var.name.clone(),
        };
        let mut specs: Vec<SlotSpec> = Vec::new();
        let layout =
            LayoutBuilder::new(self.slots.len(), &mut specs).variable(&var.ty, var.array, var.hidden);
        for spec in specs {
            let index = self.slots.len();
            self.slots.push(Slot {
                name: format!("{}{}", qualified, spec.suffix),
                var: id,
                ty: spec.ty,
                index: spec.index,
                process: var.owner,
                offset: index * SLOT_BYTES,
                initial: 0,
            });
        }
        if matches!(var.ty, VarType::Scalar { .. }) {
            let mut leaves = Vec::new();
            layout.collect_slots(&mut leaves);
            for s in leaves {
                self.slots[s].initial = init;
            }
        }
        self.entries[id.0] = Entry {
            layout,
            name: qualified,
            process: process.to_string(),
        };
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Size of the vector in bytes.
    pub fn byte_size(&self) -> usize {
        self.slots.len() * SLOT_BYTES
    }

    pub fn layout(&self, var: VarId) -> Option<&Layout> {
        self.entries.get(var.0).map(|e| &e.layout)
    }

    /// Qualified name of a variable.
    pub fn name(&self, var: VarId) -> &str {
        self.entries.get(var.0).map_or("?", |e| e.name.as_str())
    }

    pub fn priority(&self) -> VarId {
        self.priority
    }

    pub fn nr_pr(&self) -> Option<VarId> {
        self.nr_pr
    }

    pub fn never_pc(&self) -> Option<VarId> {
        self.never_pc
    }

    pub fn pc(&self, process: ProcId) -> VarId {
        self.pcs[process.0]
    }

    pub fn pid(&self, process: ProcId) -> VarId {
        self.pids[process.0]
    }

    /// The contiguous slots of a process instance: pc, pid, parameters and locals.
    pub fn process_slots(&self, process: ProcId) -> Range<usize> {
        self.process_ranges.get(process.0).cloned().unwrap_or(0..0)
    }

    /// Slot of a scalar variable without index.
    pub fn scalar_slot(&self, var: VarId) -> Option<usize> {
        match self.layout(var)? {
            Layout::Native { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Slot of element `index` of a scalar array.
    pub fn element_slot(&self, var: VarId, index: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.var == var && s.index == Some(index))
    }

    /// Initial values, one per slot.
    pub fn initial_state(&self) -> Vec<i32> {
        self.slots.iter().map(|s| s.initial).collect()
    }

    /// Resolve an identifier to the slots it denotes. A non-constant index
    /// selects every element it could denote.
    pub fn resolve(&self, id: &Identifier) -> BuildResult<SlotRef> {
        let entry = self.entries.get(id.var.0).ok_or(BuildError::UnknownVariable {
            var: id.var.0,
            span: Span::dummy(),
        })?;
        let mut exact = true;
        let mut sel: SmallVec<[&Layout; 1]> = SmallVec::new();
        sel.push(&entry.layout);
        if let Some(index) = &id.index {
            sel = self.select_index(entry, sel, index, &mut exact)?;
        }

        let mut member = id.member.as_deref();
        while let Some(m) = member {
            match m {
                Member::Field {
                    name,
                    index,
                    member: next,
                } => {
                    let mut fields = SmallVec::new();
                    for l in sel {
                        match l {
                            Layout::Struct { fields: fs, .. } => {
                                let f = fs.iter().find(|(n, _)| n == name).ok_or_else(|| {
                                    BuildError::internal(format!("{} has no field {}", entry.name, name))
                                })?;
                                fields.push(&f.1);
                            }
                            _ => {
                                return Err(BuildError::internal(format!(
                                    "field {} of non-struct {}",
                                    name, entry.name
                                )))
                            }
                        }
                    }
                    sel = fields;
                    if let Some(index) = index {
                        sel = self.select_index(entry, sel, index, &mut exact)?;
                    }
                    member = next.as_deref();
                }
                Member::Fill => {
                    let mut slots = SmallVec::new();
                    for l in &sel {
                        match self.channel_of(entry, l)? {
                            Some((fill, _)) => slots.push(fill),
                            None => exact = false,
                        }
                    }
                    exact &= slots.len() == 1;
                    return Ok(SlotRef {
                        slots,
                        exact,
                        leaf: true,
                    });
                }
                Member::Buffer { row, field } => {
                    let row_value = row.constant_value();
                    let mut slots = SmallVec::new();
                    for l in &sel {
                        let Some((_, rows)) = self.channel_of(entry, l)? else {
                            exact = false;
                            continue;
                        };
                        match row_value {
                            Some(r) => {
                                let cells = usize::try_from(r)
                                    .ok()
                                    .and_then(|r| rows.get(r))
                                    .ok_or_else(|| BuildError::IndexOutOfBounds {
                                        variable: entry.name.clone(),
                                        index: r,
                                        size: rows.len(),
                                        span: Span::dummy(),
                                    })?;
                                let s = cells.get(*field).ok_or_else(|| {
                                    BuildError::internal(format!(
                                        "message field {} of {}",
                                        field, entry.name
                                    ))
                                })?;
                                slots.push(*s);
                            }
                            None => {
                                exact = false;
                                for cells in rows {
                                    if let Some(s) = cells.get(*field) {
                                        slots.push(*s);
                                    }
                                }
                            }
                        }
                    }
                    exact &= slots.len() == 1;
                    return Ok(SlotRef {
                        slots,
                        exact,
                        leaf: true,
                    });
                }
            }
        }

        let leaf = sel.iter().all(|l| l.is_leaf());
        let mut all = Vec::new();
        for l in &sel {
            if matches!(l, Layout::Unbound) {
                return Err(BuildError::UnresolvedBufferSize {
                    process: entry.process.clone(),
                    channel: entry.name.clone(),
                    span: Span::dummy(),
                });
            }
            l.collect_slots(&mut all);
        }
        exact &= sel.len() == 1 && matches!(sel[0], Layout::Native { .. });
        Ok(SlotRef {
            slots: all.into_iter().collect(),
            exact,
            leaf,
        })
    }

    /// Resolve the target of a write. Writing a composite node is an
    /// internal error: upstream type resolution let something through.
    pub fn resolve_write(&self, id: &Identifier) -> BuildResult<SlotRef> {
        let r = self.resolve(id)?;
        if !r.leaf {
            return Err(BuildError::internal(format!(
                "write to non-scalar {}",
                self.name(id.var)
            )));
        }
        Ok(r)
    }

    /// The fill slot and rows of the channel at `layout`; `None` for a
    /// rendezvous channel.
    fn channel_of<'a>(
        &self,
        entry: &Entry,
        layout: &'a Layout,
    ) -> BuildResult<Option<(usize, &'a Vec<Vec<usize>>)>> {
        match layout {
            Layout::Channel { fill, rows } => Ok(Some((*fill, rows))),
            Layout::Rendezvous { .. } => Ok(None),
            Layout::Unbound => Err(BuildError::UnresolvedBufferSize {
                process: entry.process.clone(),
                channel: entry.name.clone(),
                span: Span::dummy(),
            }),
            _ => Err(BuildError::internal(format!(
                "channel access on non-channel {}",
                entry.name
            ))),
        }
    }

    fn select_index<'a>(
        &self,
        entry: &Entry,
        sel: SmallVec<[&'a Layout; 1]>,
        index: &Expr,
        exact: &mut bool,
    ) -> BuildResult<SmallVec<[&'a Layout; 1]>> {
        let constant = index.constant_value();
        let mut out = SmallVec::new();
        for l in sel {
            let Layout::Array { elems } = l else {
                return Err(BuildError::internal(format!("index on non-array {}", entry.name)));
            };
            match constant {
                Some(i) => {
                    let elem = usize::try_from(i).ok().and_then(|i| elems.get(i)).ok_or_else(|| {
                        BuildError::IndexOutOfBounds {
                            variable: entry.name.clone(),
                            index: i,
                            size: elems.len(),
                            span: Span::dummy(),
                        }
                    })?;
                    out.push(elem);
                }
                None => {
                    *exact = false;
                    out.extend(elems.iter());
                }
            }
        }
        Ok(out)
    }
}

fn initial_value(variables: &[Variable], id: VarId) -> BuildResult<i32> {
    let var = variables.get(id.0).ok_or(BuildError::UnknownVariable {
        var: id.0,
        span: Span::dummy(),
    })?;
    match &var.init {
        None => Ok(0),
        Some(e) => e.constant_value().ok_or_else(|| {
            BuildError::unsupported("-", format!("non-constant initializer of {}", var.name), var.span)
        }),
    }
}

fn spec_has_runs(spec: &Specification) -> bool {
    let mut found = false;
    for automaton in spec.automata() {
        for t in &automaton.transitions {
            for a in &t.actions {
                a.visit_exprs(&mut |e| found |= matches!(e, Expr::Run(_)));
            }
        }
    }
    found
}
