//! Kernel abstraction tying the table, the platform and the CPUs together.
//!
//! This module provides the main `Kernel` struct. It owns the table lock
//! and implements the blocking operations on top of the table: a unit that
//! has to wait goes to sleep and switches to its CPU's dispatch loop with
//! the lock held, and the loop hands the lock back when it switches to the
//! next unit.

use crate::arch::Arch;
use crate::config::SchedConfig;
use crate::errors::{InvalidOperationError, KernelError, KernelResult, WaitError};
use crate::platform::Platform;
use crate::sched::{HybridScheduler, Scheduler};
use crate::thread::{JoinMode, JoinStep, Pid, ProcState, ProcTable, WaitChannel, WaitStep};
use crate::time::{TickCounter, Ticks};
use core::cell::UnsafeCell;
use core::fmt;
use portable_atomic::{AtomicUsize, Ordering};

extern crate alloc;
use alloc::vec::Vec;

/// Per-CPU state.
struct Cpu<A: Arch> {
    /// Raw identifier of the unit running here, 0 when idle
    current: AtomicUsize,
    /// Context the dispatch loop of this CPU resumes from
    scheduler: UnsafeCell<A::SavedContext>,
}

// Safety: the scheduler context is only touched by its own CPU, with the
// table lock held.
unsafe impl<A: Arch> Sync for Cpu<A> {}

/// Main kernel handle.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation
/// * `P` - Virtual-memory and file collaborators
/// * `S` - Scheduler implementation
pub struct Kernel<A: Arch, P: Platform, S: Scheduler = HybridScheduler> {
    table: spin::Mutex<ProcTable<A, S>>,
    platform: P,
    ticks: TickCounter,
    cpus: Vec<Cpu<A>>,
}

impl<A: Arch, P: Platform> Kernel<A, P, HybridScheduler> {
    /// Create a kernel for `ncpu` CPUs with the default scheduler.
    pub fn new(platform: P, ncpu: usize) -> Self {
        Self::with_config(platform, ncpu, SchedConfig::default())
    }

    pub fn with_config(platform: P, ncpu: usize, config: SchedConfig) -> Self {
        Self::with_scheduler(platform, ncpu, HybridScheduler::new(config))
    }
}

impl<A: Arch, P: Platform, S: Scheduler> Kernel<A, P, S> {
    /// Create a kernel for `ncpu` CPUs scheduled by `sched`.
    pub fn with_scheduler(platform: P, ncpu: usize, sched: S) -> Self {
        assert!(ncpu > 0, "kernel needs at least one CPU");
        let cpus = (0..ncpu)
            .map(|_| Cpu {
                current: AtomicUsize::new(0),
                scheduler: UnsafeCell::new(A::SavedContext::default()),
            })
            .collect();

        Self {
            table: spin::Mutex::new(ProcTable::new(sched)),
            platform,
            ticks: TickCounter::default(),
            cpus,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn ticks(&self) -> &TickCounter {
        &self.ticks
    }

    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// Run `f` with the table locked and interrupts masked.
    pub fn with_table<R>(&self, f: impl FnOnce(&mut ProcTable<A, S>) -> R) -> R {
        let enabled = A::interrupts_enabled();
        A::disable_interrupts();
        let result = f(&mut self.table.lock());
        if enabled {
            A::enable_interrupts();
        }
        result
    }

    /// The unit running on `cpu`, if any.
    pub fn current(&self, cpu: usize) -> Option<Pid> {
        Pid::new(self.cpus[cpu].current.load(Ordering::Acquire))
    }

    fn current_pid(&self, cpu: usize) -> KernelResult<Pid> {
        self.current(cpu)
            .ok_or(KernelError::InvalidOperation(InvalidOperationError::NoCurrentUnit(cpu)))
    }

    /// Create the first user unit.
    pub fn user_init(&self, image: &[u8]) -> Pid {
        self.with_table(|table| table.user_init(&self.platform, image))
    }

    /// Advance the clock by one tick and wake the tick sleepers.
    ///
    /// Called from the timer interrupt of one CPU.
    pub fn timer_tick(&self) -> Ticks {
        let now = self.ticks.increment();
        self.with_table(|table| table.wakeup(WaitChannel::Ticks));
        now
    }

    /// Per-CPU dispatch loop. Never returns.
    ///
    /// Each pass opens a short window with interrupts enabled, then runs one
    /// dispatch round with the table locked. The chosen unit inherits the
    /// lock and releases it once it is back in its own code.
    pub fn scheduler(&self, cpu: usize) -> ! {
        let slot = &self.cpus[cpu];
        log::info!("cpu{}: starting dispatch loop", cpu);
        loop {
            A::enable_interrupts();
            A::disable_interrupts();

            let mut table = self.table.lock();
            table.dispatch_round(|table, pid| {
                let start = self.ticks.ticks();
                slot.current.store(pid.get(), Ordering::Release);
                let next = table.context_ptr(pid);
                // Safety: both contexts live as long as the kernel and are
                // only switched with the table lock held.
                unsafe { A::context_switch(slot.scheduler.get(), next) };
                slot.current.store(0, Ordering::Release);
                self.ticks.since(start)
            });
            drop(table);
        }
    }

    /// Switch from the current unit of `cpu` back to the dispatch loop.
    ///
    /// The caller holds the table lock and has already moved the unit out
    /// of Running.
    fn sched(&self, cpu: usize, table: &mut ProcTable<A, S>) {
        let Some(pid) = self.current(cpu) else {
            panic!("sched: nothing running on cpu{}", cpu);
        };
        if table.state_of(pid) == ProcState::Running {
            panic!("sched running");
        }
        if A::interrupts_enabled() {
            panic!("sched interruptible");
        }

        let prev = table.context_ptr(pid);
        // Safety: see `scheduler`.
        unsafe { A::context_switch(prev, self.cpus[cpu].scheduler.get()) };
    }

    /// First code every new unit runs after its first switch: release the
    /// lock the dispatch loop took on its behalf.
    ///
    /// # Safety
    ///
    /// Must only be called once, on a fresh unit's first entry, while the
    /// dispatch loop that switched to it holds the table lock.
    pub unsafe fn fork_return(&self) {
        // Safety: the caller guarantees the lock is held on our behalf.
        unsafe { self.table.force_unlock() };
        A::enable_interrupts();
    }

    /// Give up the CPU for one dispatch round.
    pub fn yield_now(&self, cpu: usize) -> KernelResult<()> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| {
            table.yield_unit(pid);
            self.sched(cpu, table);
        });
        Ok(())
    }

    pub fn getpid(&self, cpu: usize) -> KernelResult<Pid> {
        self.current_pid(cpu)
    }

    pub fn fork(&self, cpu: usize) -> KernelResult<Pid> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| table.fork(&self.platform, pid))
    }

    /// Terminate the current unit. Never returns.
    pub fn exit(&self, cpu: usize) -> ! {
        let Some(pid) = self.current(cpu) else {
            panic!("exit: nothing running on cpu{}", cpu);
        };
        self.with_table(|table| {
            if let Err(err) = table.exit(&self.platform, pid) {
                panic!("exit of pid {}: {}", pid, err);
            }
            self.sched(cpu, table);
        });
        panic!("zombie exit");
    }

    /// Wait for a child of the current unit to exit and reap it.
    pub fn wait(&self, cpu: usize) -> KernelResult<Pid> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| loop {
            match table.wait(&self.platform, pid)? {
                WaitStep::Reaped(child) => return Ok(child),
                WaitStep::Block(chan) => {
                    table.sleep(pid, chan);
                    self.sched(cpu, table);
                }
            }
        })
    }

    pub fn kill(&self, pid: Pid) -> KernelResult<()> {
        self.with_table(|table| table.kill(pid))
    }

    /// Reserve `share` percent of the CPU for the current unit.
    pub fn set_cpu_share(&self, cpu: usize, share: u32) -> KernelResult<u32> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| table.set_cpu_share(pid, share))
    }

    /// Resize the current unit's address space, returning the old size.
    pub fn grow(&self, cpu: usize, delta: isize) -> KernelResult<usize> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| table.grow(&self.platform, pid, delta))
    }

    /// Sleep until `duration` ticks have passed.
    pub fn sleep_ticks(&self, cpu: usize, duration: Ticks) -> KernelResult<()> {
        let pid = self.current_pid(cpu)?;
        let start = self.ticks.ticks();
        self.with_table(|table| {
            while self.ticks.since(start) < duration {
                if table.get(pid).map_or(true, |unit| unit.killed()) {
                    return Err(WaitError::Killed.into());
                }
                table.sleep(pid, WaitChannel::Ticks);
                self.sched(cpu, table);
            }
            Ok(())
        })
    }

    /// Start a thread in the current unit's address space.
    pub fn thread_create(&self, cpu: usize, entry: usize, arg: usize) -> KernelResult<Pid> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| table.thread_create(&self.platform, pid, entry, arg))
    }

    /// Wait for thread `tid`, a child of the current unit, and reclaim it.
    pub fn thread_join(&self, cpu: usize, tid: Pid) -> KernelResult<usize> {
        self.join(cpu, tid, JoinMode::Child)
    }

    /// Reclaim thread `tid` regardless of who created it.
    pub fn thread_join_emergency(&self, cpu: usize, tid: Pid) -> KernelResult<usize> {
        self.join(cpu, tid, JoinMode::Emergency)
    }

    fn join(&self, cpu: usize, tid: Pid, mode: JoinMode) -> KernelResult<usize> {
        let pid = self.current_pid(cpu)?;
        self.with_table(|table| loop {
            match table.thread_join(&self.platform, pid, tid, mode)? {
                JoinStep::Joined(retval) => return Ok(retval),
                JoinStep::Block(chan) => {
                    table.sleep(pid, chan);
                    self.sched(cpu, table);
                }
            }
        })
    }

    /// Finish the current thread with `retval`. Never returns.
    ///
    /// A unit that owns its address space leaves as if it called `exit`.
    pub fn thread_exit(&self, cpu: usize, retval: usize) -> ! {
        let Some(pid) = self.current(cpu) else {
            panic!("thread_exit: nothing running on cpu{}", cpu);
        };
        self.with_table(|table| {
            let is_thread = table.get(pid).map_or(false, |unit| unit.binding().is_thread());
            let result = if is_thread {
                table.finish_thread(&self.platform, pid, retval)
            } else {
                table.exit(&self.platform, pid)
            };
            if let Err(err) = result {
                panic!("thread_exit of pid {}: {}", pid, err);
            }
            self.sched(cpu, table);
        });
        panic!("zombie exit");
    }

    /// Finish thread `tid` on behalf of another unit and return.
    pub fn thread_exit_external(&self, tid: Pid, retval: usize) -> KernelResult<()> {
        self.with_table(|table| table.finish_thread(&self.platform, tid, retval))
    }

    /// Print every live unit. Gives up if the table is locked elsewhere.
    pub fn procdump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        match self.table.try_lock() {
            Some(table) => table.procdump(out),
            None => writeln!(out, "procdump: table busy"),
        }
    }

    /// Pretend the dispatch loop of `cpu` switched to `pid`.
    #[cfg(test)]
    pub(crate) fn run_on(&self, cpu: usize, pid: Pid) {
        self.with_table(|table| {
            if let Some(unit) = table.get_mut(pid) {
                unit.state = ProcState::Running;
            }
        });
        self.cpus[cpu].current.store(pid.get(), Ordering::Release);
    }
}
