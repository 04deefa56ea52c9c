//! Model construction options.

use crate::progress::ProgressCounters;
use std::sync::Arc;

/// How hard the guard matrix walker tries to extract simple predicates.
/// Higher levels prove more independence at a higher cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aggressiveness {
    /// Only plain scalar variables compared to constants.
    Weak,
    /// Adds constant-indexed array elements and struct fields, channel
    /// lengths and constant folding.
    Normal,
    /// Adds channel polls and receives, channel operations and remote
    /// references.
    High,
    /// Adds write-set limited co-enabledness and must-write sharpening.
    Highest,
}

impl Default for Aggressiveness {
    fn default() -> Self {
        Aggressiveness::High
    }
}

/// Configuration for model construction.
#[derive(Clone)]
pub struct Options {
    /// Skip the guard matrices. Labels are still built and the matrices are
    /// filled with their conservative values.
    pub no_gm: bool,
    /// Let NES/NDS use must-write facts to rule out enabling by overwrite.
    pub must_write: bool,
    /// Predicate extraction level for the guard matrices.
    pub aggressiveness: Aggressiveness,
    /// With a never claim: let the claim keep stepping once the system
    /// deadlocks.
    pub never_deadlock_continuation: bool,
    /// Split guard labels into CNF clauses before de-duplication.
    pub cnf: bool,
    /// Shared progress counters, updated by the matrix passes.
    pub progress: Option<Arc<ProgressCounters>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            no_gm: false,
            must_write: false,
            aggressiveness: Aggressiveness::default(),
            never_deadlock_continuation: true,
            cnf: false,
            progress: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("no_gm", &self.no_gm)
            .field("must_write", &self.must_write)
            .field("aggressiveness", &self.aggressiveness)
            .field("never_deadlock_continuation", &self.never_deadlock_continuation)
            .field("cnf", &self.cnf)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
