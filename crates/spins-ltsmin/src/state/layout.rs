//! Type layout tree: how a variable maps onto state vector slots.

use spins_ast::{ChannelType, ScalarType, StructType, VarType};

/// The shape of a variable in the state vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// One slot.
    Native { slot: usize, ty: ScalarType },
    /// One layout per element.
    Array { elems: Vec<Layout> },
    /// One layout per field, in declaration order.
    Struct {
        name: String,
        fields: Vec<(String, Layout)>,
    },
    /// A buffered channel: the fill count, then `capacity` rows of one slot
    /// per message field. Row 0 is the head of the queue.
    Channel { fill: usize, rows: Vec<Vec<usize>> },
    /// A rendezvous channel: no slots.
    Rendezvous { arity: usize },
    /// A channel parameter; it aliases whatever channel it is bound to.
    Unbound,
    /// A hidden variable: not part of the state vector.
    Hidden,
}

impl Layout {
    /// Append every slot below this node, in vector order.
    pub fn collect_slots(&self, out: &mut Vec<usize>) {
        match self {
            Layout::Native { slot, .. } => out.push(*slot),
            Layout::Array { elems } => elems.iter().for_each(|e| e.collect_slots(out)),
            Layout::Struct { fields, .. } => fields.iter().for_each(|(_, f)| f.collect_slots(out)),
            Layout::Channel { fill, rows } => {
                out.push(*fill);
                rows.iter().flatten().for_each(|s| out.push(*s));
            }
            Layout::Rendezvous { .. } | Layout::Unbound | Layout::Hidden => {}
        }
    }

    pub fn slot_count(&self) -> usize {
        let mut slots = Vec::new();
        self.collect_slots(&mut slots);
        slots.len()
    }

    /// A node that can be the target of a write.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Layout::Native { .. } | Layout::Hidden)
    }
}

/// A slot description produced while laying out a variable.
#[derive(Debug, Clone)]
pub(crate) struct SlotSpec {
    pub suffix: String,
    pub ty: ScalarType,
    /// Element of the variable's own array dimension.
    pub index: Option<usize>,
}

/// Allocates slots for one variable, recording their name suffixes.
pub(crate) struct LayoutBuilder<'a> {
    next: usize,
    element: Option<usize>,
    specs: &'a mut Vec<SlotSpec>,
}

impl<'a> LayoutBuilder<'a> {
    pub(crate) fn new(first_slot: usize, specs: &'a mut Vec<SlotSpec>) -> Self {
        Self {
            next: first_slot,
            element: None,
            specs,
        }
    }

    fn slot(&mut self, suffix: String, ty: ScalarType) -> usize {
        let slot = self.next;
        self.next += 1;
        self.specs.push(SlotSpec {
            suffix,
            ty,
            index: self.element,
        });
        slot
    }

    /// Lay out a (possibly array) variable of type `ty`.
    pub(crate) fn variable(&mut self, ty: &VarType, array: Option<usize>, hidden: bool) -> Layout {
        if hidden {
            return Layout::Hidden;
        }
        match array {
            Some(n) => {
                let elems = (0..n)
                    .map(|i| {
                        self.element = Some(i);
                        self.single(ty, format!("[{}]", i))
                    })
                    .collect();
                self.element = None;
                Layout::Array { elems }
            }
            None => self.single(ty, String::new()),
        }
    }

    fn single(&mut self, ty: &VarType, prefix: String) -> Layout {
        match ty {
            VarType::Scalar { scalar } => Layout::Native {
                slot: self.slot(prefix, *scalar),
                ty: *scalar,
            },
            VarType::Struct(st) => self.structure(st, prefix),
            VarType::Channel(ct) => self.channel(ct, prefix),
        }
    }

    fn structure(&mut self, st: &StructType, prefix: String) -> Layout {
        let mut fields = Vec::with_capacity(st.fields.len());
        for field in &st.fields {
            let base = format!("{}.{}", prefix, field.name);
            let layout = match field.array {
                Some(n) => Layout::Array {
                    elems: (0..n)
                        .map(|i| self.single(&field.ty, format!("{}[{}]", base, i)))
                        .collect(),
                },
                None => self.single(&field.ty, base),
            };
            fields.push((field.name.clone(), layout));
        }
        Layout::Struct {
            name: st.name.clone(),
            fields,
        }
    }

    fn channel(&mut self, ct: &ChannelType, prefix: String) -> Layout {
        match ct.capacity {
            None => Layout::Unbound,
            Some(0) => Layout::Rendezvous { arity: ct.arity() },
            Some(capacity) => {
                let fill = self.slot(format!("{}.fill", prefix), ScalarType::Byte);
                let rows = (0..capacity)
                    .map(|r| {
                        ct.fields
                            .iter()
                            .enumerate()
                            .map(|(m, ty)| self.slot(format!("{}.buf[{}].m{}", prefix, r, m), *ty))
                            .collect()
                    })
                    .collect();
                Layout::Channel { fill, rows }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spins_ast::Field;

    fn lay(ty: &VarType, array: Option<usize>) -> (Layout, Vec<SlotSpec>) {
        let mut specs = Vec::new();
        let layout = LayoutBuilder::new(0, &mut specs).variable(ty, array, false);
        (layout, specs)
    }

    #[test]
    fn test_scalar_array_slots() {
        for scalar in [ScalarType::Bit, ScalarType::Byte, ScalarType::Short, ScalarType::Int] {
            let (layout, _) = lay(&VarType::scalar(scalar), Some(4));
            assert_eq!(layout.slot_count(), 4);
        }
    }

    #[test]
    fn test_channel_slots() {
        let ty = VarType::channel(3, vec![ScalarType::Byte, ScalarType::Int]);
        let (layout, specs) = lay(&ty, None);
        assert_eq!(layout.slot_count(), 1 + 3 * 2);
        assert_eq!(specs[0].suffix, ".fill");
        assert_eq!(specs[6].suffix, ".buf[2].m1");
        match layout {
            Layout::Channel { fill, rows } => {
                assert_eq!(fill, 0);
                assert_eq!(rows[0], vec![1, 2]);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_rendezvous_has_no_slots() {
        let (layout, specs) = lay(&VarType::channel(0, vec![ScalarType::Byte]), Some(2));
        assert_eq!(layout.slot_count(), 0);
        assert!(specs.is_empty());
    }

    #[test]
    fn test_struct_fields_recurse() {
        let ty = VarType::Struct(StructType {
            name: "pair".into(),
            fields: vec![
                Field {
                    name: "a".into(),
                    ty: VarType::byte(),
                    array: Some(2),
                },
                Field {
                    name: "b".into(),
                    ty: VarType::int(),
                    array: None,
                },
            ],
        });
        let (layout, specs) = lay(&ty, None);
        assert_eq!(layout.slot_count(), 3);
        let names: Vec<_> = specs.iter().map(|s| s.suffix.as_str()).collect();
        assert_eq!(names, vec![".a[0]", ".a[1]", ".b"]);
    }

    #[test]
    fn test_hidden_has_no_slots() {
        let mut specs = Vec::new();
        let layout = LayoutBuilder::new(0, &mut specs).variable(&VarType::int(), None, true);
        assert_eq!(layout, Layout::Hidden);
        assert!(layout.is_leaf());
    }
}
