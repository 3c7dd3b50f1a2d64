//! Three-level multi-level feedback queue.
//!
//! Each level is a circular doubly-linked list threaded through a fixed
//! array of records, one record per table slot. Links are slot indices, so a
//! unit can be unlinked in O(1) without any pointer bookkeeping.
//!
//! Level 0 has the highest priority. A unit that accumulates its level's
//! tick budget is demoted one level, and every `boost_interval` selections
//! all members of the lower levels are moved back to level 0.

use super::trait_def::UnitStates;
use crate::config::{SchedConfig, NLEVELS, NPROC};
use crate::thread::{Pid, ProcState};
use crate::time::Ticks;

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

/// Per-unit MLFQ bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
struct MlfqRecord {
    /// Back-reference to the unit, set while the record is a member
    pid: Option<Pid>,
    /// Current level, `None` when not a member
    level: Option<usize>,
    /// Ticks charged since the unit arrived at its current level
    level_ticks: Ticks,
    /// Set once the unit has been selected since it became the head
    has_run: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

/// One priority level.
#[derive(Debug, Clone, Copy)]
struct LevelQueue {
    /// Ticks a member may accumulate here before it is demoted
    budget: Ticks,
    /// Selections the head may get before it rotates behind its peers
    rr_limit: u64,
    rr_tick: u64,
    len: usize,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LevelQueue {
    fn new(budget: Ticks, rr_limit: u64) -> Self {
        Self {
            budget,
            rr_limit,
            rr_tick: 0,
            len: 0,
            head: None,
            tail: None,
        }
    }
}

/// The MLFQ pool.
#[derive(Debug)]
pub struct Mlfq {
    records: Vec<MlfqRecord>,
    levels: [LevelQueue; NLEVELS],
    boost_interval: u64,
    /// Selections made so far, drives the periodic boost
    clock: u64,
}

impl Default for Mlfq {
    fn default() -> Self {
        Self::new(&SchedConfig::default())
    }
}

impl Mlfq {
    pub fn new(config: &SchedConfig) -> Self {
        Self::with_capacity(config, NPROC)
    }

    /// Create a pool with records for `capacity` table slots.
    pub fn with_capacity(config: &SchedConfig, capacity: usize) -> Self {
        let mut levels = [LevelQueue::new(0, 0); NLEVELS];
        for (level, queue) in levels.iter_mut().enumerate() {
            *queue = LevelQueue::new(config.level_budget[level], config.rr_quantum[level]);
        }

        Self {
            records: vec![MlfqRecord::default(); capacity],
            levels,
            boost_interval: config.boost_interval,
            clock: 0,
        }
    }

    /// Level of `pid`, or `None` if it is not in the pool.
    pub fn level_of(&self, pid: Pid) -> Option<usize> {
        self.records.get(pid.slot()).and_then(|record| record.level)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.level_of(pid).is_some()
    }

    /// Number of members at `level`.
    pub fn len(&self, level: usize) -> usize {
        self.levels[level].len
    }

    /// Number of members across all levels.
    pub fn total(&self) -> usize {
        self.levels.iter().map(|queue| queue.len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Ticks `pid` has accumulated at its current level.
    pub fn level_ticks(&self, pid: Pid) -> Option<Ticks> {
        let record = self.records.get(pid.slot())?;
        record.level.map(|_| record.level_ticks)
    }

    /// Members of `level` from head to tail.
    pub fn members(&self, level: usize) -> Vec<Pid> {
        let queue = &self.levels[level];
        let mut members = Vec::with_capacity(queue.len);
        let mut cursor = queue.head;
        for _ in 0..queue.len {
            let Some(index) = cursor else { break };
            if let Some(pid) = self.records[index].pid {
                members.push(pid);
            }
            cursor = self.records[index].next;
        }
        members
    }

    /// Add `pid` to the tail of level 0. Members are left where they are.
    pub fn admit(&mut self, pid: Pid) {
        let index = pid.slot();
        if index >= self.records.len() {
            log::warn!("mlfq: pid {} has no record", pid);
            return;
        }
        if self.records[index].level.is_some() {
            return;
        }
        self.enqueue(index, pid, 0);
        log::trace!("mlfq: admitted pid {} at level 0", pid);
    }

    /// Remove `pid` from the pool, if it is a member.
    pub fn remove(&mut self, pid: Pid) {
        let index = pid.slot();
        if self.records.get(index).map_or(false, |record| record.level.is_some()) {
            self.unlink(index);
            self.records[index] = MlfqRecord::default();
        }
    }

    /// Charge `ran` ticks to `pid`.
    pub fn charge(&mut self, pid: Pid, ran: Ticks) {
        if let Some(record) = self.records.get_mut(pid.slot()) {
            if record.level.is_some() {
                record.level_ticks = record.level_ticks.saturating_add(ran);
            }
        }
    }

    /// Whether `pid` has used up its level's budget and may still move down.
    pub fn budget_exhausted(&self, pid: Pid) -> bool {
        let Some(record) = self.records.get(pid.slot()) else {
            return false;
        };
        match record.level {
            Some(level) if level + 1 < NLEVELS => record.level_ticks >= self.levels[level].budget,
            _ => false,
        }
    }

    /// Move `pid` one level down with fresh counters. The lowest level keeps it.
    pub fn demote(&mut self, pid: Pid) {
        let index = pid.slot();
        let Some(level) = self.records.get(index).and_then(|record| record.level) else {
            return;
        };
        if level + 1 >= NLEVELS {
            return;
        }
        self.unlink(index);
        self.enqueue(index, pid, level + 1);
        log::debug!("mlfq: pid {} demoted to level {}", pid, level + 1);
    }

    /// Move every member of the lower levels back to level 0.
    pub fn boost(&mut self) {
        for level in 1..NLEVELS {
            while let Some(index) = self.levels[level].head {
                let Some(pid) = self.records[index].pid else {
                    unreachable!("mlfq member without pid at level {}", level);
                };
                self.unlink(index);
                self.enqueue(index, pid, 0);
            }
            self.levels[level].rr_tick = 0;
        }
        log::trace!("mlfq: priority boost at selection {}", self.clock);
    }

    /// Pick the unit the pool runs next.
    ///
    /// Scans level 0 first. Within a level the head runs until it has used
    /// its round-robin turn, then rotates behind its peers. Non-runnable
    /// heads are rotated, and heads whose unit is gone are dropped.
    pub fn next_runnable<V: UnitStates + ?Sized>(&mut self, units: &V) -> Option<Pid> {
        self.clock += 1;
        if self.boost_interval != 0 && self.clock % self.boost_interval == 0 {
            self.boost();
        }

        (0..NLEVELS).find_map(|level| self.pick_level(level, units))
    }

    fn pick_level<V: UnitStates + ?Sized>(&mut self, level: usize, units: &V) -> Option<Pid> {
        let previous_head = self.levels[level].head;
        let mut head = self.settle(level, units)?;

        let queue = &self.levels[level];
        if queue.len > 1 && self.records[head].has_run && queue.rr_tick >= queue.rr_limit {
            self.records[head].has_run = false;
            self.rotate(level);
            head = self.settle(level, units)?;
        }

        if Some(head) != previous_head || !self.records[head].has_run {
            self.levels[level].rr_tick = 0;
        }
        self.records[head].has_run = true;
        self.levels[level].rr_tick += 1;
        self.records[head].pid
    }

    /// Bring a runnable member to the head of `level`.
    ///
    /// Every member is looked at once at most. Returns the head index if it
    /// is runnable afterwards.
    fn settle<V: UnitStates + ?Sized>(&mut self, level: usize, units: &V) -> Option<usize> {
        for _ in 0..self.levels[level].len {
            let head = self.levels[level].head?;
            let pid = self.records[head].pid?;
            match units.state_of(pid) {
                ProcState::Runnable => return Some(head),
                ProcState::Zombie | ProcState::Unused => {
                    self.unlink(head);
                    self.records[head] = MlfqRecord::default();
                }
                _ => {
                    self.records[head].has_run = false;
                    self.rotate(level);
                }
            }
        }
        let head = self.levels[level].head?;
        let pid = self.records[head].pid?;
        (units.state_of(pid) == ProcState::Runnable).then_some(head)
    }

    fn enqueue(&mut self, index: usize, pid: Pid, level: usize) {
        let queue = &mut self.levels[level];
        let (prev, next) = match (queue.head, queue.tail) {
            (Some(head), Some(tail)) => (tail, head),
            _ => (index, index),
        };

        self.records[index] = MlfqRecord {
            pid: Some(pid),
            level: Some(level),
            prev: Some(prev),
            next: Some(next),
            ..MlfqRecord::default()
        };

        if queue.len == 0 {
            queue.head = Some(index);
        } else {
            self.records[prev].next = Some(index);
            self.records[next].prev = Some(index);
        }
        queue.tail = Some(index);
        queue.len += 1;
    }

    fn unlink(&mut self, index: usize) {
        let Some(level) = self.records[index].level else {
            return;
        };
        let queue = &mut self.levels[level];
        if queue.len == 1 {
            queue.head = None;
            queue.tail = None;
            queue.rr_tick = 0;
        } else {
            let (Some(prev), Some(next)) = (self.records[index].prev, self.records[index].next) else {
                unreachable!("mlfq record {} is not linked", index);
            };
            self.records[prev].next = Some(next);
            self.records[next].prev = Some(prev);
            if queue.head == Some(index) {
                queue.head = Some(next);
                queue.rr_tick = 0;
            }
            if queue.tail == Some(index) {
                queue.tail = Some(prev);
            }
        }
        queue.len -= 1;

        let record = &mut self.records[index];
        record.prev = None;
        record.next = None;
        record.level = None;
    }

    /// Move the head of `level` to the tail.
    fn rotate(&mut self, level: usize) {
        let queue = &mut self.levels[level];
        if queue.len < 2 {
            return;
        }
        if let Some(head) = queue.head {
            queue.tail = Some(head);
            queue.head = self.records[head].next;
            queue.rr_tick = 0;
        }
    }

    /// Check the list invariants of every level.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (level, queue) in self.levels.iter().enumerate() {
            match queue.len {
                0 => assert!(queue.head.is_none() && queue.tail.is_none()),
                _ => {
                    let head = queue.head.unwrap();
                    let tail = queue.tail.unwrap();
                    assert_eq!(self.records[head].prev, Some(tail));
                    assert_eq!(self.records[tail].next, Some(head));
                    let mut cursor = head;
                    for _ in 0..queue.len {
                        assert_eq!(self.records[cursor].level, Some(level));
                        cursor = self.records[cursor].next.unwrap();
                    }
                    assert_eq!(cursor, head);
                }
            }
        }
        let members = self.records.iter().filter(|record| record.level.is_some()).count();
        assert_eq!(members, self.total());
    }
}
