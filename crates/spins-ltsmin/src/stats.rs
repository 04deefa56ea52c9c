//! Summary numbers of a built model.

use crate::matrix::DepMatrix;
use crate::model::Model;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixStats {
    pub name: String,
    /// Cleared cells: proven facts for the guard matrices, independence
    /// for the dependency matrices.
    pub negatives: usize,
    pub cells: usize,
}

impl MatrixStats {
    fn of(name: &str, m: &DepMatrix) -> Self {
        Self {
            name: name.to_string(),
            negatives: m.zeros(),
            cells: m.rows() * m.cols(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStats {
    pub slots: usize,
    pub state_bytes: usize,
    pub groups: usize,
    pub labels: usize,
    pub guard_labels: usize,
    pub assertions: usize,
    pub has_atomic_cycles: bool,
    pub matrices: Vec<MatrixStats>,
}

impl ModelStats {
    pub fn of(model: &Model) -> Self {
        let deps = model.dependencies();
        let gi = model.guard_info();
        let mut matrices = vec![
            MatrixStats::of("read", &deps.full.read),
            MatrixStats::of("may-write", &deps.full.may_write),
            MatrixStats::of("must-write", &deps.full.must_write),
            MatrixStats::of("MCE", &gi.co_enabled),
            MatrixStats::of("MCD", &gi.co_disabled),
            MatrixStats::of("NES", &gi.nes),
            MatrixStats::of("NDS", &gi.nds),
            MatrixStats::of("visibility", &gi.visibility),
        ];
        matrices.extend(gi.extra.iter().map(|(name, m)| MatrixStats::of(name, m)));
        Self {
            slots: model.state_vector().len(),
            state_bytes: model.state_vector().byte_size(),
            groups: model.group_count(),
            labels: model.labels().len(),
            guard_labels: model.labels().guard_count(),
            assertions: model.assertions().len(),
            has_atomic_cycles: model.has_atomic_cycles(),
            matrices,
        }
    }
}

impl fmt::Display for ModelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "state vector: {} slots ({} bytes)", self.slots, self.state_bytes)?;
        writeln!(f, "transition groups: {}", self.groups)?;
        writeln!(f, "labels: {} ({} guards)", self.labels, self.guard_labels)?;
        if self.assertions > 0 {
            writeln!(f, "pid assertions: {}", self.assertions)?;
        }
        if self.has_atomic_cycles {
            writeln!(f, "warning: atomic cycles")?;
        }
        for m in &self.matrices {
            writeln!(f, "  !{:<12} {:>8} / {}", m.name, m.negatives, m.cells)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_model, Options};
    use spins_ast::{Action, Expr, Identifier, SpecBuilder, VarType, Variable};

    #[test]
    fn test_report_lists_matrices() {
        let mut b = SpecBuilder::new();
        let x = b.global(Variable::new("x", VarType::int()));
        b.process("P", |p| {
            p.sequence(vec![Action::assign(Identifier::new(x), Expr::constant(1))]);
        });
        let model = build_model(&b.build(), &Options::default()).unwrap();
        let stats = ModelStats::of(&model);
        assert_eq!(stats.slots, 4);
        assert_eq!(stats.groups, 2);
        let report = stats.to_string();
        assert!(report.starts_with("state vector: 4 slots (16 bytes)"));
        assert!(report.contains("!MCE"));
        assert!(report.contains("!commutes"));
    }
}
