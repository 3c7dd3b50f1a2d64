//! Compile-time capacities and tunable scheduling parameters.
//!
//! Capacities size the fixed tables and never change at runtime. The
//! [`SchedConfig`] value carries the MLFQ and stride knobs and is handed to
//! the scheduler when a table is built.

/// Maximum number of execution units (processes and threads) alive at once.
pub const NPROC: usize = 64;

/// Number of stride table entries. Identifiers at or above this value cannot
/// reserve a CPU share.
pub const NSTRIDE: usize = 64;

/// Open files per execution unit.
pub const NOFILE: usize = 16;

/// Page size of the address-space collaborator.
pub const PGSIZE: usize = 4096;

/// Size of each kernel stack handed out by the kernel-stack pool.
pub const KSTACKSIZE: usize = 4096;

/// Thread stack slots a single address space can hand out.
pub const MAX_THREAD_SLOTS: usize = 64;

/// Pages mapped for every thread stack region (the lower one is a guard page).
pub const THREAD_STACK_PAGES: usize = 2;

/// Bytes covered by one thread stack region.
pub const THREAD_STACK_SIZE: usize = THREAD_STACK_PAGES * PGSIZE;

/// Number of MLFQ priority levels.
pub const NLEVELS: usize = 3;

/// Identifiers `1..=RESERVED_PIDS` belong to the kernel's bookkeeping units
/// (init and the first shell). They are never affiliated with a policy and
/// run whenever the table scan reaches them.
pub const RESERVED_PIDS: usize = 2;

/// Longest name kept for an execution unit.
pub const MAX_NAME_LEN: usize = 16;

/// Scheduling parameters shared by the MLFQ pool and the stride table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Ticks a unit may accumulate at each level before it is demoted.
    pub level_budget: [u64; NLEVELS],
    /// Ticks a queue head may hold the CPU before rotating behind its peers.
    pub rr_quantum: [u64; NLEVELS],
    /// Pool selections between two priority boosts. Zero disables boosting.
    pub boost_interval: u64,
    /// Upper bound on the sum of all reserved shares.
    pub share_ceiling: u32,
    /// Numerator of the stride: a winner's path advances by `stride_scale / share`.
    pub stride_scale: u64,
}

impl SchedConfig {
    /// The parameters the teaching kernel ships with.
    pub const fn new() -> Self {
        Self {
            level_budget: [5, 10, u64::MAX],
            rr_quantum: [1, 2, 4],
            boost_interval: 100,
            share_ceiling: 80,
            stride_scale: 10_000,
        }
    }

    pub const fn with_boost_interval(mut self, interval: u64) -> Self {
        self.boost_interval = interval;
        self
    }

    pub const fn with_level_budget(mut self, budget: [u64; NLEVELS]) -> Self {
        self.level_budget = budget;
        self
    }

    pub const fn with_rr_quantum(mut self, quantum: [u64; NLEVELS]) -> Self {
        self.rr_quantum = quantum;
        self
    }

    /// # Panics
    ///
    /// Panics if `ceiling` is above 100 percent.
    pub const fn with_share_ceiling(mut self, ceiling: u32) -> Self {
        assert!(ceiling <= 100, "share ceiling above 100%");
        self.share_ceiling = ceiling;
        self
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters() {
        let config = SchedConfig::default();
        assert_eq!(config.level_budget, [5, 10, u64::MAX]);
        assert_eq!(config.rr_quantum, [1, 2, 4]);
        assert_eq!(config.boost_interval, 100);
        assert_eq!(config.share_ceiling, 80);
    }

    #[test]
    fn test_builders_override_single_fields() {
        let config = SchedConfig::new().with_boost_interval(0).with_share_ceiling(50);
        assert_eq!(config.boost_interval, 0);
        assert_eq!(config.share_ceiling, 50);
        assert_eq!(config.rr_quantum, SchedConfig::new().rr_quantum);
    }

    #[test]
    #[should_panic(expected = "share ceiling above 100%")]
    fn test_share_ceiling_above_full_cpu_is_rejected() {
        let _ = SchedConfig::new().with_share_ceiling(101);
    }
}
