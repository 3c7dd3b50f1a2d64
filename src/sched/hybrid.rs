//! Stride scheduling with the MLFQ pool as one of the participants.

use super::mlfq::Mlfq;
use super::stride::{StrideTable, Winner};
use super::trait_def::{Affiliation, Scheduler, UnitStates};
use crate::config::SchedConfig;
use crate::errors::ShareError;
use crate::thread::{Pid, ProcState};
use crate::time::Ticks;

/// The default scheduler of the kernel.
///
/// The stride table picks first. When the pool wins, the MLFQ picks among
/// the units without a reservation. If the pool has nobody runnable the
/// stride pick is repeated, so that the pool's turn goes to the reserved
/// units in proportion to their shares.
#[derive(Debug)]
pub struct HybridScheduler {
    mlfq: Mlfq,
    stride: StrideTable,
    config: SchedConfig,
}

impl Default for HybridScheduler {
    fn default() -> Self {
        Self::new(SchedConfig::default())
    }
}

impl HybridScheduler {
    pub fn new(config: SchedConfig) -> Self {
        Self {
            mlfq: Mlfq::new(&config),
            stride: StrideTable::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn mlfq(&self) -> &Mlfq {
        &self.mlfq
    }

    pub fn stride(&self) -> &StrideTable {
        &self.stride
    }
}

impl Scheduler for HybridScheduler {
    fn affiliation(&self, pid: Pid) -> Affiliation {
        if let Some(share) = self.stride.share_of(pid) {
            Affiliation::Stride { share }
        } else if let Some(level) = self.mlfq.level_of(pid) {
            Affiliation::Mlfq { level }
        } else {
            Affiliation::None
        }
    }

    fn admit(&mut self, pid: Pid) {
        if !self.stride.is_reserved(pid) {
            self.mlfq.admit(pid);
        }
    }

    fn next_runnable<V: UnitStates + ?Sized>(&mut self, units: &V) -> Option<Pid> {
        loop {
            match self.stride.pick(units) {
                Winner::Unit(pid) => {
                    log::trace!("sched: stride picked pid {}", pid);
                    return Some(pid);
                }
                Winner::Pool => {
                    if let Some(pid) = self.mlfq.next_runnable(units) {
                        log::trace!("sched: mlfq picked pid {}", pid);
                        return Some(pid);
                    }
                    // The pool's path has moved on, so a reserved unit
                    // wins within a bounded number of picks.
                    if !self.stride.has_reservations() {
                        return None;
                    }
                }
            }
        }
    }

    fn on_return(&mut self, pid: Pid, state: ProcState, ran: Ticks) {
        self.mlfq.charge(pid, ran);

        if state == ProcState::Zombie {
            self.forget(pid);
        } else if self.stride.is_reserved(pid) {
            self.mlfq.remove(pid);
        } else if self.mlfq.budget_exhausted(pid) {
            self.mlfq.demote(pid);
        }
    }

    fn reserve(&mut self, pid: Pid, share: u32) -> Result<u32, ShareError> {
        let granted = self.stride.reserve(pid, share)?;
        self.mlfq.remove(pid);
        Ok(granted)
    }

    fn forget(&mut self, pid: Pid) {
        self.stride.release(pid);
        self.mlfq.remove(pid);
    }
}
