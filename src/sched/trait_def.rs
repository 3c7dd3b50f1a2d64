//! Scheduler trait definition.
//!
//! The dispatch loop scans the process table and asks a [`Scheduler`] which
//! unit runs next. The scheduler keeps its own per-unit bookkeeping, indexed
//! by identifier, and is only ever touched with the table lock held.

use crate::errors::ShareError;
use crate::thread::{Pid, Proc, ProcState};
use crate::time::Ticks;
use crate::arch::Arch;

/// Read access to unit states, as seen by a scheduler.
pub trait UnitStates {
    /// State of `pid`, or [`ProcState::Unused`] if it names no slot.
    fn state_of(&self, pid: Pid) -> ProcState;
}

impl<A: Arch> UnitStates for [Proc<A>] {
    fn state_of(&self, pid: Pid) -> ProcState {
        self.get(pid.slot()).map_or(ProcState::Unused, Proc::state)
    }
}

impl UnitStates for [ProcState] {
    fn state_of(&self, pid: Pid) -> ProcState {
        self.get(pid.slot()).copied().unwrap_or_default()
    }
}

/// Which policy currently schedules a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    /// Not yet observed by the scheduler
    None,
    /// Member of the MLFQ pool at `level`
    Mlfq { level: usize },
    /// Holds a reserved CPU share
    Stride { share: u32 },
}

/// Scheduling policy consulted by the dispatch loop.
///
/// This trait defines the interface that all scheduler implementations must
/// provide. The table scan and context switch stay in the dispatch loop; an
/// implementation only decides who runs and keeps the accounting.
pub trait Scheduler: Send {
    /// Current affiliation of `pid`.
    fn affiliation(&self, pid: Pid) -> Affiliation;

    /// Whether `pid` is already affiliated with some policy.
    fn manages(&self, pid: Pid) -> bool {
        self.affiliation(pid) != Affiliation::None
    }

    /// Affiliate a newly observed runnable unit with the default policy.
    fn admit(&mut self, pid: Pid);

    /// Pick the next unit to run.
    ///
    /// Units found Zombie or Unused are dropped from the bookkeeping on the
    /// way. Returns `None` if no affiliated unit is runnable.
    fn next_runnable<V: UnitStates + ?Sized>(&mut self, units: &V) -> Option<Pid>;

    /// Account for a dispatch of `pid` that lasted `ran` ticks and left the
    /// unit in `state`.
    fn on_return(&mut self, pid: Pid, state: ProcState, ran: Ticks);

    /// Reserve `share` percent of the CPU for `pid`.
    ///
    /// # Returns
    ///
    /// The granted share, or the reason for rejection. A rejected request
    /// leaves every reservation unchanged.
    fn reserve(&mut self, pid: Pid, share: u32) -> Result<u32, ShareError>;

    /// Drop all bookkeeping for a unit that is being reclaimed.
    fn forget(&mut self, pid: Pid);
}
