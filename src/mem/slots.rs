//! Thread stack slots of a shared address space.
//!
//! Threads get their user stacks above the owner's original image, one
//! fixed-size region per slot. The owner tracks which slots are taken in a
//! bitmap so that joined threads free their region for reuse and the address
//! space can shrink back once the topmost threads are gone.

use crate::config::{MAX_THREAD_SLOTS, THREAD_STACK_SIZE};
use crate::mem::vm::pg_round_up;

/// Stack-slot bookkeeping kept by an address-space owner that spawned threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSlots {
    /// Bit `n` set means slot `n` holds a live thread stack
    bitmap: u64,
    /// Start of each slot's region, kept after release while it stays mapped
    regions: [Option<usize>; MAX_THREAD_SLOTS],
    /// Size of the address space before the first thread was created
    base_size: usize,
}

const _: () = assert!(MAX_THREAD_SLOTS <= u64::BITS as usize);

impl StackSlots {
    /// Start slot bookkeeping for an address space currently `size` bytes large.
    pub fn new(size: usize) -> Self {
        Self {
            bitmap: 0,
            regions: [None; MAX_THREAD_SLOTS],
            base_size: size,
        }
    }

    /// Claim the lowest free slot for an address space of `size` bytes.
    ///
    /// The slot gets its old region back if that region is still inside the
    /// space. Otherwise the region is placed at the first page boundary at or
    /// above `size`, so memory grown after threading started is never handed
    /// out as a stack.
    pub fn claim(&mut self, size: usize) -> Option<usize> {
        let slot = (!self.bitmap).trailing_zeros() as usize;
        if slot >= MAX_THREAD_SLOTS {
            return None;
        }
        let start = match self.regions[slot] {
            Some(start) if start + THREAD_STACK_SIZE <= size => start,
            _ => pg_round_up(size),
        };
        self.regions[slot] = Some(start);
        self.bitmap |= 1 << slot;
        Some(slot)
    }

    /// Release a slot of an address space that is now `size` bytes large.
    ///
    /// # Returns
    ///
    /// The size the space can shrink to: free stack regions sitting at the
    /// top of the space are dropped, anything else above them stays. When
    /// the last slot goes and only stacks were above the original image,
    /// that is the size before threading.
    ///
    /// # Panics
    ///
    /// Releasing a free slot is a bookkeeping bug.
    pub fn release(&mut self, slot: usize, size: usize) -> usize {
        assert!(self.is_taken(slot), "release of free thread stack slot {}", slot);
        self.bitmap &= !(1 << slot);
        self.truncate(size);

        let mut top = size;
        while let Some(free) = (0..MAX_THREAD_SLOTS).find(|&candidate| {
            !self.is_taken(candidate)
                && self.regions[candidate].map_or(false, |start| start + THREAD_STACK_SIZE == top)
        }) {
            top = self.regions[free].take().unwrap_or(top);
        }

        if self.bitmap == 0 && top == pg_round_up(self.base_size) {
            top = top.min(self.base_size);
        }
        top
    }

    /// Forget free regions that no longer fit in a space of `size` bytes.
    pub fn truncate(&mut self, size: usize) {
        for slot in 0..MAX_THREAD_SLOTS {
            if self.is_taken(slot) {
                continue;
            }
            if self.regions[slot].map_or(false, |start| start + THREAD_STACK_SIZE > size) {
                self.regions[slot] = None;
            }
        }
    }

    pub fn is_taken(&self, slot: usize) -> bool {
        slot < MAX_THREAD_SLOTS && self.bitmap & (1 << slot) != 0
    }

    /// Highest slot still in use.
    pub fn highest(&self) -> Option<usize> {
        (self.bitmap != 0).then(|| (u64::BITS - 1 - self.bitmap.leading_zeros()) as usize)
    }

    /// Number of slots in use.
    pub fn in_use(&self) -> usize {
        self.bitmap.count_ones() as usize
    }

    /// Byte range `[start, end)` of a slot's stack region, if it has one.
    pub fn region(&self, slot: usize) -> Option<(usize, usize)> {
        let start = (*self.regions.get(slot)?)?;
        Some((start, start + THREAD_STACK_SIZE))
    }
}
