//! Progress reporting for the long running passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Phase {
    Idle = 0,
    Transitions = 1,
    Labels = 2,
    Dependencies = 3,
    GuardMatrices = 4,
    Done = 5,
}

impl Phase {
    fn from_index(index: usize) -> Self {
        match index {
            1 => Phase::Transitions,
            2 => Phase::Labels,
            3 => Phase::Dependencies,
            4 => Phase::GuardMatrices,
            5 => Phase::Done,
            _ => Phase::Idle,
        }
    }
}

/// Lock-free progress counters shared between the model builder and a
/// caller polling them from another thread. Never blocks the builder.
pub struct ProgressCounters {
    /// Work items finished in the current phase.
    pub done: AtomicUsize,
    /// Work items of the current phase.
    pub total: AtomicUsize,
    phase: AtomicUsize,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            phase: AtomicUsize::new(Phase::Idle as usize),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_index(self.phase.load(Ordering::Relaxed))
    }

    fn enter(&self, phase: Phase, total: usize) {
        self.done.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.phase.store(phase as usize, Ordering::Relaxed);
    }
}

/// Tracks one phase: updates the shared counters and logs its duration.
pub(crate) struct PhaseTimer {
    phase: Phase,
    counters: Option<Arc<ProgressCounters>>,
    started: Instant,
}

impl PhaseTimer {
    pub(crate) fn start(
        phase: Phase,
        total: usize,
        counters: Option<&Arc<ProgressCounters>>,
    ) -> Self {
        debug!(?phase, total, "phase started");
        if let Some(c) = counters {
            c.enter(phase, total);
        }
        Self {
            phase,
            counters: counters.cloned(),
            started: Instant::now(),
        }
    }

    /// Record `n` finished work items.
    pub(crate) fn advance(&self, n: usize) {
        if let Some(c) = &self.counters {
            c.done.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    pub(crate) fn finish(self) {
        info!(
            phase = ?self.phase,
            elapsed_ms = self.elapsed_ms() as u64,
            "phase done"
        );
        if let Some(c) = &self.counters {
            if self.phase == Phase::GuardMatrices {
                c.enter(Phase::Done, 0);
            }
        }
    }
}

/// Log a totals line for a matrix pass: proven negatives out of all pairs.
pub(crate) fn report_negatives(name: &str, negatives: usize, total: usize) {
    info!("{}: {} / {}", name, negatives, total);
}
