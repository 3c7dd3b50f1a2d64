//! Stride scheduling for units with a reserved CPU share.
//!
//! Every participant advances a virtual `path` by `stride_scale / share`
//! each time it is picked, and the participant with the smallest path wins.
//! Over many picks each participant is chosen in proportion to its share.
//!
//! Entry 0 stands for the whole MLFQ pool. Its share is whatever the
//! reservations leave over, so the pool never drops below
//! `100 - share_ceiling` percent.

use super::trait_def::UnitStates;
use crate::config::{SchedConfig, NSTRIDE, RESERVED_PIDS};
use crate::errors::ShareError;
use crate::thread::{Pid, ProcState};

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

/// Index of the entry representing the MLFQ pool.
const POOL: usize = 0;

#[derive(Debug, Clone, Copy, Default)]
struct StrideEntry {
    /// Reserved percentage
    share: u32,
    /// Whether the entry takes part in the competition
    full: bool,
    path: u64,
    pid: Option<Pid>,
}

/// Outcome of a stride pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The MLFQ pool won; the pool decides which unit runs.
    Pool,
    /// A unit holding a reservation won.
    Unit(Pid),
}

/// Share table indexed by identifier.
#[derive(Debug)]
pub struct StrideTable {
    entries: Vec<StrideEntry>,
    /// Sum of all reserved shares
    reserved: u32,
    ceiling: u32,
    scale: u64,
}

impl Default for StrideTable {
    fn default() -> Self {
        Self::new(&SchedConfig::default())
    }
}

impl StrideTable {
    pub fn new(config: &SchedConfig) -> Self {
        let mut entries = vec![StrideEntry::default(); NSTRIDE];
        entries[POOL] = StrideEntry {
            share: 100,
            full: true,
            path: 0,
            pid: None,
        };

        Self {
            entries,
            reserved: 0,
            ceiling: config.share_ceiling.min(100),
            scale: config.stride_scale,
        }
    }

    /// Sum of all reserved shares.
    pub fn reserved_total(&self) -> u32 {
        self.reserved
    }

    /// Share the MLFQ pool competes with.
    pub fn pool_share(&self) -> u32 {
        self.entries[POOL].share
    }

    /// Share reserved by `pid`, if any.
    pub fn share_of(&self, pid: Pid) -> Option<u32> {
        let entry = self.entries.get(pid.get())?;
        entry.full.then_some(entry.share)
    }

    pub fn is_reserved(&self, pid: Pid) -> bool {
        self.share_of(pid).is_some()
    }

    /// Whether any unit holds a reservation.
    pub fn has_reservations(&self) -> bool {
        self.reserved > 0
    }

    /// Current path of `pid`, or of the pool for `None`.
    pub fn path_of(&self, pid: Option<Pid>) -> Option<u64> {
        let index = pid.map_or(POOL, Pid::get);
        let entry = self.entries.get(index)?;
        entry.full.then_some(entry.path)
    }

    /// Reserve `share` percent of the CPU for `pid`.
    ///
    /// A second reservation by the same unit replaces the first. On success
    /// every path, the pool's included, starts over at zero.
    pub fn reserve(&mut self, pid: Pid, share: u32) -> Result<u32, ShareError> {
        if share == 0 {
            return Err(ShareError::InvalidShare(share));
        }
        let index = pid.get();
        if index <= RESERVED_PIDS || index >= self.entries.len() {
            log::warn!("stride: pid {} cannot reserve a share", pid);
            return Err(ShareError::PidOutOfRange(pid));
        }

        let previous = if self.entries[index].full { self.entries[index].share } else { 0 };
        let others = self.reserved - previous;
        if others.checked_add(share).map_or(true, |total| total > self.ceiling) {
            let available = self.ceiling.saturating_sub(others);
            log::warn!(
                "stride: pid {} asked for {}%, only {}% left",
                pid,
                share,
                available
            );
            return Err(ShareError::CeilingExceeded { requested: share, available });
        }

        self.entries[index] = StrideEntry {
            share,
            full: true,
            path: 0,
            pid: Some(pid),
        };
        self.reserved = others + share;
        self.entries[POOL].share = 100 - self.reserved;
        for entry in self.entries.iter_mut().filter(|entry| entry.full) {
            entry.path = 0;
        }

        log::info!(
            "stride: pid {} reserved {}%, pool share now {}%",
            pid,
            share,
            self.entries[POOL].share
        );
        Ok(share)
    }

    /// Drop the reservation of `pid`. Returns the released share.
    pub fn release(&mut self, pid: Pid) -> Option<u32> {
        let index = pid.get();
        if index == POOL || index >= self.entries.len() || !self.entries[index].full {
            return None;
        }

        let share = self.entries[index].share;
        self.entries[index] = StrideEntry::default();
        self.reserved -= share;
        self.entries[POOL].share = 100 - self.reserved;
        log::debug!("stride: pid {} released {}%", pid, share);
        Some(share)
    }

    /// Pick the participant with the smallest path and advance it.
    ///
    /// Reservations whose unit has exited are released first. Ties go to
    /// the lowest index, so the pool wins ties with every unit.
    pub fn pick<V: UnitStates + ?Sized>(&mut self, units: &V) -> Winner {
        let first = RESERVED_PIDS + 1;
        for index in first..self.entries.len() {
            let entry = self.entries[index];
            let Some(pid) = entry.pid.filter(|_| entry.full) else {
                continue;
            };
            if matches!(units.state_of(pid), ProcState::Zombie | ProcState::Unused) {
                self.release(pid);
            }
        }

        let mut best = POOL;
        for index in first..self.entries.len() {
            let entry = &self.entries[index];
            if entry.full && entry.path < self.entries[best].path {
                best = index;
            }
        }

        let winner = &mut self.entries[best];
        winner.path += self.scale / u64::from(winner.share.max(1));
        match winner.pid {
            Some(pid) if best != POOL => Winner::Unit(pid),
            _ => Winner::Pool,
        }
    }
}
