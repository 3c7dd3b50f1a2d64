//! Kernel stack pool.
//!
//! Every execution unit owns one kernel stack from allocation until it is
//! reaped. Stacks are recycled through a free list, and the pool can be
//! capped so that stack exhaustion behaves like the page allocator running
//! dry.

use crate::config::KSTACKSIZE;
use portable_atomic::{AtomicUsize, Ordering};
use spin::Mutex;

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// A kernel stack owned by one execution unit.
pub struct KernelStack {
    memory: Box<[u8]>,
}

impl KernelStack {
    /// Get the stack size in bytes.
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Address of the lowest byte of the stack.
    pub fn base(&self) -> usize {
        self.memory.as_ptr() as usize
    }

    /// Initial stack pointer (highest address, 16-byte aligned).
    pub fn top(&self) -> usize {
        (self.base() + self.size()) & !0xF
    }
}

impl core::fmt::Debug for KernelStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KernelStack")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &self.size())
            .finish()
    }
}

/// Pool-based allocator for kernel stacks.
pub struct KernelStackPool {
    /// Stacks returned by reaped units
    free: Mutex<Vec<KernelStack>>,
    /// Maximum number of stacks handed out at once (`usize::MAX` = unbounded)
    limit: usize,
    /// Statistics counters
    stats: KernelStackStats,
}

#[derive(Debug, Default)]
struct KernelStackStats {
    /// Number of stacks allocated from the heap
    allocated: AtomicUsize,
    /// Number of stacks returned to the pool
    deallocated: AtomicUsize,
    /// Number of stacks currently in use
    in_use: AtomicUsize,
}

impl Default for KernelStackPool {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelStackPool {
    /// Create an unbounded pool.
    pub const fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Create a pool that refuses to hand out more than `limit` stacks at once.
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            limit,
            stats: KernelStackStats {
                allocated: AtomicUsize::new(0),
                deallocated: AtomicUsize::new(0),
                in_use: AtomicUsize::new(0),
            },
        }
    }

    /// Allocate a kernel stack.
    ///
    /// Reuses a stack from the free list when possible.
    ///
    /// # Returns
    ///
    /// A stack, or `None` when the pool limit has been reached.
    pub fn allocate(&self) -> Option<KernelStack> {
        let claimed = self
            .stats
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_use| {
                (in_use < self.limit).then_some(in_use + 1)
            });
        if claimed.is_err() {
            log::warn!("kernel stack pool exhausted ({} in use)", self.limit);
            return None;
        }

        if let Some(stack) = self.free.lock().pop() {
            return Some(stack);
        }

        self.stats.allocated.fetch_add(1, Ordering::AcqRel);
        Some(KernelStack {
            memory: vec![0u8; KSTACKSIZE].into_boxed_slice(),
        })
    }

    /// Return a stack to the pool for reuse.
    pub fn deallocate(&self, stack: KernelStack) {
        self.free.lock().push(stack);
        self.stats.in_use.fetch_sub(1, Ordering::AcqRel);
        self.stats.deallocated.fetch_add(1, Ordering::AcqRel);
    }

    /// Get statistics about the pool: (allocated, deallocated, in use).
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.allocated.load(Ordering::Acquire),
            self.stats.deallocated.load(Ordering::Acquire),
            self.stats.in_use.load(Ordering::Acquire),
        )
    }
}
