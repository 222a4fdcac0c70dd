//! Solver Profiling Counters
//!
//! Deterministic per-solver counters for the solve pipeline stages. Counts
//! invocations and iterations rather than wall-clock time, so the numbers are
//! reproducible across runs and platforms and can be asserted on in tests.

/// Accumulated counters for one [`crate::Solver`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Number of solve calls (any variant)
    pub solve_calls: u64,
    /// Impulse iterations actually executed across all solve calls
    pub impulse_iterations: u64,
    /// Displacement iterations actually executed across all solve calls
    pub displacement_iterations: u64,
    /// Impulse loops that exited early on an unproductive sweep
    pub impulse_early_exits: u64,
    /// Displacement loops that exited early on an unproductive sweep
    pub displacement_early_exits: u64,
    /// Joints marshaled into packed batches across all solve calls
    pub joints_packed: u64,
}

impl SolverStats {
    /// Reset all counters to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
