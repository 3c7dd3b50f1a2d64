//! The process table and its state machine.
//!
//! The table is the single source of truth for which units exist and what
//! state they are in. It is always accessed with the kernel's table lock
//! held, which also covers the scheduler stored inside it.

use super::{AddressBinding, Pid, Proc, ProcState, WaitChannel};
use crate::arch::Arch;
use crate::config::{SchedConfig, NPROC, PGSIZE, RESERVED_PIDS};
use crate::errors::{InvalidOperationError, KernelError, KernelResult, MemoryError, SpawnError, WaitError};
use crate::mem::KernelStackPool;
use crate::platform::Platform;
use crate::sched::{Affiliation, HybridScheduler, Scheduler};
use crate::time::Ticks;
use core::fmt;

extern crate alloc;
use alloc::vec::Vec;

/// Outcome of one `wait` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    /// A zombie child was reclaimed.
    Reaped(Pid),
    /// Children exist but none has exited yet; sleep on the channel and retry.
    Block(WaitChannel),
}

/// Fixed-capacity table of execution units plus the scheduler that picks
/// among them.
pub struct ProcTable<A: Arch, S: Scheduler = HybridScheduler> {
    pub(crate) procs: Vec<Proc<A>>,
    pub(crate) sched: S,
    kstacks: KernelStackPool,
    /// Reparenting target for orphans
    pub(crate) init: Option<Pid>,
}

impl<A: Arch> ProcTable<A, HybridScheduler> {
    /// Create a table scheduled by the hybrid stride/MLFQ scheduler.
    pub fn with_config(config: SchedConfig) -> Self {
        Self::new(HybridScheduler::new(config))
    }
}

impl<A: Arch> Default for ProcTable<A, HybridScheduler> {
    fn default() -> Self {
        Self::with_config(SchedConfig::default())
    }
}

impl<A: Arch, S: Scheduler> ProcTable<A, S> {
    /// Create an empty table with `NPROC` slots.
    pub fn new(sched: S) -> Self {
        Self::with_stack_pool(sched, KernelStackPool::new())
    }

    /// Create an empty table drawing kernel stacks from `kstacks`.
    pub fn with_stack_pool(sched: S, kstacks: KernelStackPool) -> Self {
        Self {
            procs: (0..NPROC).map(Proc::new).collect(),
            sched,
            kstacks,
            init: None,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.sched
    }

    pub fn kernel_stacks(&self) -> &KernelStackPool {
        &self.kstacks
    }

    /// The first unit, which adopts orphans.
    pub fn init(&self) -> Option<Pid> {
        self.init
    }

    /// Look up a unit that has not been reclaimed.
    pub fn get(&self, pid: Pid) -> Option<&Proc<A>> {
        self.procs.get(pid.slot()).filter(|unit| unit.state.is_live())
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Proc<A>> {
        self.procs.get_mut(pid.slot()).filter(|unit| unit.state.is_live())
    }

    pub fn state_of(&self, pid: Pid) -> ProcState {
        self.procs.get(pid.slot()).map_or(ProcState::Unused, |unit| unit.state)
    }

    /// Scheduling affiliation of `pid`.
    pub fn affiliation(&self, pid: Pid) -> Affiliation {
        self.sched.affiliation(pid)
    }

    /// Live units in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Proc<A>> {
        self.procs.iter().filter(|unit| unit.state.is_live())
    }

    /// Number of live units.
    pub fn live_count(&self) -> usize {
        self.iter().count()
    }

    /// Size of the address space `pid` runs in.
    pub fn space_size(&self, pid: Pid) -> Option<usize> {
        let unit = self.get(pid)?;
        let owner = unit.binding.owner(pid)?;
        self.get(owner).map(|owner| owner.size)
    }

    pub(crate) fn live_index(&self, pid: Pid) -> KernelResult<usize> {
        self.get(pid)
            .map(|_| pid.slot())
            .ok_or_else(|| KernelError::no_such_unit(pid))
    }

    /// Pointer to the saved kernel context of `pid`, for the context switch.
    pub(crate) fn context_ptr(&mut self, pid: Pid) -> *mut A::SavedContext {
        &mut self.procs[pid.slot()].context
    }

    /// Claim the lowest unused slot.
    ///
    /// The unit comes back as an Embryo with a kernel stack and nothing
    /// else. If no kernel stack is available the slot goes back to Unused.
    pub fn alloc(&mut self) -> Result<Pid, SpawnError> {
        let Some(index) = self.procs.iter().position(|unit| unit.state == ProcState::Unused) else {
            log::warn!("proc: table full");
            return Err(SpawnError::TableFull);
        };

        let unit = &mut self.procs[index];
        unit.state = ProcState::Embryo;
        match self.kstacks.allocate() {
            Some(stack) => unit.kstack = Some(stack),
            None => {
                unit.reset();
                return Err(SpawnError::OutOfMemory);
            }
        }

        log::debug!("proc: allocated pid {}", unit.pid);
        Ok(unit.pid)
    }

    /// Give a unit's slot back, including its kernel stack.
    ///
    /// Used to roll back half-built units and to finish reclaiming zombies.
    pub(crate) fn release_slot(&mut self, index: usize) {
        let unit = &mut self.procs[index];
        if let Some(stack) = unit.kstack.take() {
            self.kstacks.deallocate(stack);
        }
        let pid = unit.pid;
        unit.reset();
        self.sched.forget(pid);
    }

    /// Create the first unit from a user program image.
    ///
    /// The unit gets a one-page address space with the image loaded at
    /// address 0 and the root directory as working directory.
    ///
    /// # Panics
    ///
    /// Panics if a first unit already exists or no resources are left; the
    /// kernel cannot come up without it.
    pub fn user_init<P: Platform + ?Sized>(&mut self, platform: &P, image: &[u8]) -> Pid {
        assert!(self.init.is_none(), "userinit: init already exists");

        let pid = match self.alloc() {
            Ok(pid) => pid,
            Err(err) => panic!("userinit: {}", err),
        };
        let Some(space) = platform.create() else {
            panic!("userinit: out of memory?");
        };
        platform.load_init(space, image);

        let unit = &mut self.procs[pid.slot()];
        unit.binding = AddressBinding::Owns(space);
        unit.size = PGSIZE;
        A::set_user_entry(&mut unit.trap_frame, 0, PGSIZE);
        unit.set_name("initcode");
        unit.cwd = Some(platform.root());
        unit.state = ProcState::Runnable;

        self.init = Some(pid);
        log::info!("proc: init is pid {}", pid);
        pid
    }

    /// Create a copy of `parent` with a duplicated address space.
    ///
    /// The child returns 0 from the trap that brought the parent in.
    pub fn fork<P: Platform + ?Sized>(&mut self, platform: &P, parent: Pid) -> KernelResult<Pid> {
        let parent_index = self.live_index(parent)?;
        let space = self.procs[parent_index]
            .binding
            .space()
            .ok_or(InvalidOperationError::NoAddressSpace(parent))?;
        let size = self.space_size(parent).unwrap_or(0);

        let child = self.alloc()?;
        let Some(copy) = platform.duplicate(space, size) else {
            self.release_slot(child.slot());
            log::warn!("proc: fork of pid {} failed to copy {:#x} bytes", parent, size);
            return Err(MemoryError::OutOfMemory.into());
        };

        let source = &self.procs[parent_index];
        let mut trap_frame = source.trap_frame.clone();
        A::set_return_value(&mut trap_frame, 0);
        let files = source.files.duplicate(platform);
        let cwd = source.cwd.map(|inode| platform.idup(inode));
        let name = source.name.clone();

        let unit = &mut self.procs[child.slot()];
        unit.binding = AddressBinding::Owns(copy);
        unit.size = size;
        unit.parent = Some(parent);
        unit.trap_frame = trap_frame;
        unit.files = files;
        unit.cwd = cwd;
        unit.set_name(&name);
        unit.state = ProcState::Runnable;

        log::debug!("proc: pid {} forked pid {}", parent, child);
        Ok(child)
    }

    /// Grow or shrink the address space `pid` runs in by `delta` bytes.
    ///
    /// Threads resize their owner's space. Returns the previous size.
    pub fn grow<P: Platform + ?Sized>(&mut self, platform: &P, pid: Pid, delta: isize) -> KernelResult<usize> {
        let index = self.live_index(pid)?;
        let binding = self.procs[index].binding;
        let (Some(owner), Some(space)) = (binding.owner(pid), binding.space()) else {
            return Err(InvalidOperationError::NoAddressSpace(pid).into());
        };
        let owner_index = self.live_index(owner)?;

        let old = self.procs[owner_index].size;
        let Some(new) = old.checked_add_signed(delta) else {
            return Err(MemoryError::GrowFailed { from: old, to: 0 }.into());
        };
        let size = if new > old {
            platform
                .grow(space, old, new)
                .ok_or(MemoryError::GrowFailed { from: old, to: new })?
        } else if new < old {
            platform.shrink(space, old, new)
        } else {
            old
        };

        let owner_unit = &mut self.procs[owner_index];
        owner_unit.size = size;
        if let Some(slots) = owner_unit.threads.as_mut() {
            slots.truncate(size);
        }
        Ok(old)
    }

    /// Terminate `pid`.
    ///
    /// Open files and the working directory are released, threads still
    /// running in the unit's address space are forced out, children are
    /// handed to init, and the parent is woken. The unit stays a Zombie
    /// until its parent reaps it. A thread calling this leaves like
    /// `thread_exit(0)`.
    ///
    /// # Panics
    ///
    /// Panics if `pid` is the init unit.
    pub fn exit<P: Platform + ?Sized>(&mut self, platform: &P, pid: Pid) -> KernelResult<()> {
        if Some(pid) == self.init {
            panic!("init exiting");
        }
        let index = self.live_index(pid)?;
        if self.procs[index].binding.is_thread() {
            return self.finish_thread(platform, pid, 0);
        }

        let unit = &mut self.procs[index];
        unit.files.close_all(platform);
        if let Some(cwd) = unit.cwd.take() {
            platform.iput(cwd);
        }

        self.stop_sharers(platform, pid);

        if let Some(parent) = self.procs[index].parent {
            self.wakeup(WaitChannel::Unit(parent));
        }
        self.reparent_children(pid, |table, child| {
            table.procs[child.slot()].binding.owner(child) != Some(pid)
        });

        self.procs[index].state = ProcState::Zombie;
        log::debug!("proc: pid {} exited", pid);
        Ok(())
    }

    /// Force every thread sharing `owner`'s address space to leave.
    ///
    /// Threads that are not on a CPU become Zombies right away. Running ones
    /// are marked killed and leave at their next trap.
    fn stop_sharers<P: Platform + ?Sized>(&mut self, platform: &P, owner: Pid) {
        for index in 0..self.procs.len() {
            let tid = self.procs[index].pid;
            if tid == owner || self.procs[index].binding.owner(tid) != Some(owner) {
                continue;
            }
            match self.procs[index].state {
                ProcState::Unused | ProcState::Zombie => {}
                ProcState::Running => self.procs[index].killed = true,
                _ => {
                    if let Err(err) = self.finish_thread(platform, tid, 0) {
                        log::warn!("proc: could not stop thread {}: {}", tid, err);
                    }
                }
            }
        }
    }

    /// Hand the children of `pid` that `select` accepts over to init.
    pub(crate) fn reparent_children<F>(&mut self, pid: Pid, mut select: F)
    where
        F: FnMut(&Self, Pid) -> bool,
    {
        let Some(init) = self.init else {
            return;
        };
        let mut zombie_adopted = false;
        for index in 0..self.procs.len() {
            let child = self.procs[index].pid;
            if self.procs[index].parent != Some(pid) || !self.procs[index].state.is_live() {
                continue;
            }
            if !select(&*self, child) {
                continue;
            }
            self.procs[index].parent = Some(init);
            zombie_adopted |= self.procs[index].state == ProcState::Zombie;
        }
        if zombie_adopted {
            self.wakeup(WaitChannel::Unit(init));
        }
    }

    /// Try to reap one exited child of `pid`.
    ///
    /// Thread children give back their stack slot. A process child is only
    /// reaped once every thread of its address space has exited; those
    /// threads are reclaimed along with it and the space is destroyed.
    pub fn wait<P: Platform + ?Sized>(&mut self, platform: &P, pid: Pid) -> KernelResult<WaitStep> {
        let index = self.live_index(pid)?;

        let mut have_children = false;
        for child_index in 0..self.procs.len() {
            let child = &self.procs[child_index];
            if child.parent != Some(pid) || !child.state.is_live() {
                continue;
            }
            have_children = true;
            if child.state != ProcState::Zombie {
                continue;
            }

            let child_pid = child.pid;
            if child.binding.is_thread() {
                self.reclaim_thread(platform, child_pid);
                return Ok(WaitStep::Reaped(child_pid));
            }
            if self.sharers(child_pid).any(|(_, state)| state != ProcState::Zombie) {
                continue;
            }
            self.reclaim_process(platform, child_pid);
            return Ok(WaitStep::Reaped(child_pid));
        }

        if !have_children {
            return Err(WaitError::NoChildren.into());
        }
        if self.procs[index].killed {
            return Err(WaitError::Killed.into());
        }
        Ok(WaitStep::Block(WaitChannel::Unit(pid)))
    }

    /// Threads running in `owner`'s address space, with their state.
    fn sharers(&self, owner: Pid) -> impl Iterator<Item = (Pid, ProcState)> + '_ {
        self.procs.iter().filter_map(move |unit| match unit.binding {
            AddressBinding::SharesWith { owner: o, .. } if o == owner && unit.state.is_live() => {
                Some((unit.pid, unit.state))
            }
            _ => None,
        })
    }

    /// Reclaim a zombie that owns its address space, together with the
    /// zombie threads of that space.
    fn reclaim_process<P: Platform + ?Sized>(&mut self, platform: &P, pid: Pid) {
        let index = pid.slot();
        let unit = &self.procs[index];
        if unit.state != ProcState::Zombie {
            panic!("reclaim of pid {} in state {:?}", pid, unit.state);
        }

        let threads: Vec<Pid> = self.sharers(pid).map(|(tid, _)| tid).collect();
        for tid in threads {
            self.release_slot(tid.slot());
        }

        if let AddressBinding::Owns(space) = self.procs[index].binding {
            platform.destroy(space);
        }
        self.release_slot(index);
        log::debug!("proc: reaped pid {}", pid);
    }

    /// Set the killed flag of `pid`. A sleeping unit is woken so that it
    /// notices; a running one is left alone.
    pub fn kill(&mut self, pid: Pid) -> KernelResult<()> {
        let unit = self.get_mut(pid).ok_or_else(|| KernelError::no_such_unit(pid))?;
        unit.killed = true;
        if unit.state == ProcState::Sleeping {
            unit.state = ProcState::Runnable;
            unit.chan = None;
        }
        log::debug!("proc: killed pid {}", pid);
        Ok(())
    }

    /// Put `pid` to sleep on `chan`. The caller switches away afterwards.
    pub fn sleep(&mut self, pid: Pid, chan: WaitChannel) {
        let unit = &mut self.procs[pid.slot()];
        unit.chan = Some(chan);
        unit.state = ProcState::Sleeping;
    }

    /// Make every unit sleeping on `chan` runnable.
    pub fn wakeup(&mut self, chan: WaitChannel) {
        for unit in self.procs.iter_mut() {
            if unit.state == ProcState::Sleeping && unit.chan == Some(chan) {
                unit.state = ProcState::Runnable;
                unit.chan = None;
            }
        }
    }

    /// Give up the CPU: `pid` goes back to Runnable.
    pub fn yield_unit(&mut self, pid: Pid) {
        let unit = &mut self.procs[pid.slot()];
        if unit.state == ProcState::Running {
            unit.state = ProcState::Runnable;
        }
    }

    /// Reserve `share` percent of the CPU for `pid`.
    pub fn set_cpu_share(&mut self, pid: Pid, share: u32) -> KernelResult<u32> {
        self.live_index(pid)?;
        Ok(self.sched.reserve(pid, share)?)
    }

    /// Run one pass of the dispatch loop.
    ///
    /// Every Runnable unit found in the table scan is a scheduling point.
    /// Units above the bookkeeping identifiers are admitted to the scheduler
    /// and the scheduler names the unit to run; the bookkeeping units run
    /// when the scan reaches them. `run` performs the switch and returns the
    /// ticks the unit used.
    ///
    /// # Returns
    ///
    /// The number of units dispatched.
    ///
    /// # Panics
    ///
    /// Panics if a unit is still Running when `run` returns.
    pub fn dispatch_round<F>(&mut self, mut run: F) -> usize
    where
        F: FnMut(&mut Self, Pid) -> Ticks,
    {
        let mut dispatched = 0;
        for index in 0..self.procs.len() {
            if self.procs[index].state != ProcState::Runnable {
                continue;
            }
            let candidate = self.procs[index].pid;

            let chosen = if candidate.get() <= RESERVED_PIDS {
                candidate
            } else {
                if !self.sched.manages(candidate) {
                    self.sched.admit(candidate);
                }
                match self.sched.next_runnable(&self.procs[..]) {
                    Some(pid) => pid,
                    None => continue,
                }
            };

            let slot = chosen.slot();
            if self.procs[slot].state != ProcState::Runnable {
                log::trace!("dispatch: pid {} no longer runnable", chosen);
                continue;
            }

            self.procs[slot].state = ProcState::Running;
            log::trace!("dispatch: running pid {}", chosen);
            let ran = run(self, chosen);

            let state = self.procs[slot].state;
            if state == ProcState::Running {
                panic!("pid {} still running after switch", chosen);
            }
            if chosen.get() > RESERVED_PIDS {
                self.sched.on_return(chosen, state, ran);
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Print one line per live unit: identifier, state and name.
    pub fn procdump<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        for unit in self.iter() {
            writeln!(out, "{} {} {}", unit.pid, unit.state.name(), unit.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::tests::helpers::{MockPlatform, TestTable};

    extern crate alloc;
    use alloc::string::String;

    #[test]
    fn test_alloc_lowest_slot_and_rollback() {
        let mut table: ProcTable<NoOpArch> =
            ProcTable::with_stack_pool(HybridScheduler::default(), KernelStackPool::with_limit(1));

        let first = table.alloc().unwrap();
        assert_eq!(first.get(), 1);
        assert_eq!(table.state_of(first), ProcState::Embryo);

        assert_eq!(table.alloc(), Err(SpawnError::OutOfMemory));
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn test_table_full() {
        let mut table = TestTable::default();
        for _ in 0..NPROC {
            table.alloc().unwrap();
        }
        assert_eq!(table.alloc(), Err(SpawnError::TableFull));
    }

    #[test]
    fn test_user_init() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, b"\x00\x01");

        let unit = table.get(init).unwrap();
        assert_eq!(unit.state(), ProcState::Runnable);
        assert_eq!(unit.size(), PGSIZE);
        assert_eq!(unit.name(), "initcode");
        assert_eq!(unit.trap_frame().sp, PGSIZE);
        assert_eq!(table.init(), Some(init));
    }

    #[test]
    fn test_fork_copies_parent() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        table.get_mut(init).unwrap().trap_frame_mut().ret = 77;

        let child = table.fork(&platform, init).unwrap();
        let unit = table.get(child).unwrap();
        assert_eq!(unit.parent(), Some(init));
        assert_eq!(unit.size(), PGSIZE);
        assert_eq!(unit.trap_frame().ret, 0);
        assert_eq!(unit.name(), "initcode");
        assert_ne!(unit.binding().space(), table.get(init).unwrap().binding().space());
        assert_eq!(platform.live_spaces(), 2);
    }

    #[test]
    fn test_fork_failure_rolls_back() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        platform.fail_duplicate(true);

        let err = table.fork(&platform, init).unwrap_err();
        assert_eq!(err, KernelError::Memory(MemoryError::OutOfMemory));
        assert_eq!(table.live_count(), 1);
        assert_eq!(table.kernel_stacks().stats().2, 1);
    }

    #[test]
    fn test_exit_and_wait() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let child = table.fork(&platform, init).unwrap();

        assert_eq!(table.wait(&platform, init), Ok(WaitStep::Block(WaitChannel::Unit(init))));

        table.sleep(init, WaitChannel::Unit(init));
        table.exit(&platform, child).unwrap();
        assert_eq!(table.state_of(child), ProcState::Zombie);
        assert_eq!(table.state_of(init), ProcState::Runnable);

        assert_eq!(table.wait(&platform, init), Ok(WaitStep::Reaped(child)));
        assert_eq!(table.state_of(child), ProcState::Unused);
        assert_eq!(platform.live_spaces(), 1);
        assert_eq!(
            table.wait(&platform, init),
            Err(KernelError::Wait(WaitError::NoChildren))
        );
    }

    #[test]
    fn test_exit_reparents_to_init() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let middle = table.fork(&platform, init).unwrap();
        let grandchild = table.fork(&platform, middle).unwrap();
        table.exit(&platform, grandchild).unwrap();

        table.sleep(init, WaitChannel::Unit(init));
        table.exit(&platform, middle).unwrap();

        assert_eq!(table.get(grandchild).unwrap().parent(), Some(init));
        assert_eq!(table.state_of(init), ProcState::Runnable);
        assert!(matches!(table.wait(&platform, init), Ok(WaitStep::Reaped(_))));
        assert!(matches!(table.wait(&platform, init), Ok(WaitStep::Reaped(_))));
    }

    #[test]
    #[should_panic(expected = "init exiting")]
    fn test_init_exit_is_fatal() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let _ = table.exit(&platform, init);
    }

    #[test]
    fn test_kill_wakes_sleeper() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let child = table.fork(&platform, init).unwrap();
        table.sleep(child, WaitChannel::Ticks);

        table.kill(child).unwrap();
        let unit = table.get(child).unwrap();
        assert!(unit.killed());
        assert_eq!(unit.state(), ProcState::Runnable);

        table.fork(&platform, child).unwrap();
        assert_eq!(table.wait(&platform, child), Err(KernelError::Wait(WaitError::Killed)));

        let ghost = Pid::new(40).unwrap();
        assert_eq!(table.kill(ghost), Err(KernelError::no_such_unit(ghost)));
    }

    #[test]
    fn test_kill_leaves_running_unit_on_cpu() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let child = table.fork(&platform, init).unwrap();
        table.get_mut(child).unwrap().state = ProcState::Running;

        table.kill(child).unwrap();
        let unit = table.get(child).unwrap();
        assert!(unit.killed());
        assert_eq!(unit.state(), ProcState::Running);
        assert_eq!(unit.chan, None);
    }

    #[test]
    fn test_wakeup_matches_channel() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let a = table.fork(&platform, init).unwrap();
        let b = table.fork(&platform, init).unwrap();
        table.sleep(a, WaitChannel::Ticks);
        table.sleep(b, WaitChannel::Unit(init));

        table.wakeup(WaitChannel::Ticks);
        assert_eq!(table.state_of(a), ProcState::Runnable);
        assert_eq!(table.state_of(b), ProcState::Sleeping);
    }

    #[test]
    fn test_grow_and_shrink() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);

        assert_eq!(table.grow(&platform, init, 3 * PGSIZE as isize), Ok(PGSIZE));
        assert_eq!(table.space_size(init), Some(4 * PGSIZE));
        assert_eq!(table.grow(&platform, init, -(2 * PGSIZE as isize)), Ok(4 * PGSIZE));
        assert_eq!(table.space_size(init), Some(2 * PGSIZE));

        platform.fail_grow(true);
        assert!(table.grow(&platform, init, PGSIZE as isize).is_err());
        assert_eq!(table.space_size(init), Some(2 * PGSIZE));
    }

    #[test]
    fn test_dispatch_runs_bookkeeping_units_directly() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);

        let mut ran = alloc::vec::Vec::new();
        let count = table.dispatch_round(|table, pid| {
            ran.push(pid);
            table.yield_unit(pid);
            1
        });
        assert_eq!(count, 1);
        assert_eq!(ran, [init]);
        assert_eq!(table.affiliation(init), Affiliation::None);
    }

    #[test]
    fn test_dispatch_admits_and_demotes() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let shell = table.fork(&platform, init).unwrap();
        let worker = table.fork(&platform, init).unwrap();
        table.sleep(init, WaitChannel::Unit(init));
        table.sleep(shell, WaitChannel::Unit(shell));

        for _ in 0..5 {
            table.dispatch_round(|table, pid| {
                table.yield_unit(pid);
                1
            });
        }
        assert_eq!(table.affiliation(worker), Affiliation::Mlfq { level: 1 });
    }

    #[test]
    fn test_dispatch_evicts_zombies() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let _shell = table.fork(&platform, init).unwrap();
        let worker = table.fork(&platform, init).unwrap();
        table.set_cpu_share(worker, 30).unwrap();

        table.dispatch_round(|table, pid| {
            if pid == worker {
                table.exit(&platform, pid).unwrap();
            } else {
                table.yield_unit(pid);
            }
            0
        });
        assert_eq!(table.state_of(worker), ProcState::Zombie);
        assert_eq!(table.affiliation(worker), Affiliation::None);
        assert_eq!(table.scheduler().stride().reserved_total(), 0);
    }

    #[test]
    #[should_panic(expected = "still running after switch")]
    fn test_unit_left_running_is_fatal() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        table.user_init(&platform, &[]);
        table.dispatch_round(|_, _| 0);
    }

    #[test]
    fn test_procdump() {
        let platform = MockPlatform::new();
        let mut table = TestTable::default();
        let init = table.user_init(&platform, &[]);
        let child = table.fork(&platform, init).unwrap();
        table.sleep(child, WaitChannel::Ticks);

        let mut out = String::new();
        table.procdump(&mut out).unwrap();
        assert_eq!(out, "1 runble initcode\n2 sleep  initcode\n");
    }
}
