//! Model construction for LTSmin's PINS interface.
//!
//! [`build_model`] turns an instantiated [`spins_ast::Specification`] into a
//! [`Model`]: a flat state vector, the transition groups of the product of
//! all processes with the never claim, a label table, the read/write
//! dependency matrices and the guard matrices used for partial order
//! reduction. The stages run in that order and each consumes only the
//! finished output of the previous ones.

mod builder;
pub mod dm;
pub mod error;
pub mod eval;
mod gm;
pub mod guard_info;
pub mod matrix;
pub mod model;
pub mod options;
pub mod progress;
pub mod state;
pub mod stats;

pub use dm::Dependencies;
pub use error::{BuildError, BuildResult};
pub use eval::{eval_expr, eval_guard, EvalError};
pub use guard_info::{GuardInfo, Label, LabelKind, LabelTable};
pub use matrix::{DepMatrix, DepRow, RWMatrix};
pub use model::guard::Guard;
pub use model::transition::{Effect, Node, Transition, TransitionKind};
pub use model::{Assertion, Model};
pub use options::{Aggressiveness, Options};
pub use progress::{Phase, ProgressCounters};
pub use state::{Layout, Slot, SlotRef, StateVector};
pub use stats::{MatrixStats, ModelStats};

use model::ModelParts;
use progress::PhaseTimer;
use spins_ast::Specification;
use tracing::info;

/// Build the complete model of `spec`.
pub fn build_model(spec: &Specification, options: &Options) -> BuildResult<Model> {
    let spec = builder::bind::bind_runs(spec)?;
    let mut variables = spec.variables.clone();
    let state = StateVector::build(&spec, &mut variables)?;
    info!(
        slots = state.len(),
        bytes = state.byte_size(),
        processes = spec.processes.len(),
        "state vector"
    );

    let built = builder::build_transitions(&spec, &variables, &state, options)?;

    let timer = PhaseTimer::start(Phase::Labels, built.transitions.len(), options.progress.as_ref());
    let labels = LabelTable::build(
        &spec,
        &variables,
        &state,
        &built.transitions,
        &built.never_accepting,
        options.cnf,
    );
    timer.finish();

    let deps = dm::build_dependencies(&state, &built.transitions, &labels, &built.deadlock, options)?;

    let guard_info = if options.no_gm {
        info!("guard matrices skipped");
        GuardInfo::conservative(labels, built.transitions.len())
    } else {
        gm::build_guard_info(&state, &built.transitions, labels, &deps, &built.deadlock, options)?
    };

    Ok(Model::new(ModelParts {
        variables,
        state,
        transitions: built.transitions,
        deadlock: built.deadlock,
        guard_info,
        deps,
        assertions: built.assertions,
        has_atomic_cycles: built.has_atomic_cycles,
        mtypes: spec.mtypes.clone(),
    }))
}
