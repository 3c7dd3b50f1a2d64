//! Lightweight threads.
//!
//! A thread is an execution unit bound to another unit's address space.
//! Its user stack lives in a stack slot above the owner's original image,
//! and the owner's size grows to cover the highest slot in use. Joining a
//! thread gives its slot back and shrinks the space again; the space itself
//! is only destroyed when the owner is reaped.

use super::table::ProcTable;
use super::{AddressBinding, Pid, ProcState, WaitChannel};
use crate::arch::Arch;
use crate::errors::{InvalidOperationError, JoinError, KernelResult, MemoryError};
use crate::mem::StackSlots;
use crate::platform::Platform;
use crate::sched::Scheduler;
use core::mem::size_of;

/// Return address planted under a new thread's argument. Returning from
/// the start routine faults on it.
pub const FAKE_RETURN_PC: usize = 0xffff_ffff;

/// Who may join a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Only the thread's parent.
    Child,
    /// Anybody; used to clean up threads outside the parent/child path.
    Emergency,
}

/// Outcome of one `thread_join` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    /// The thread was reclaimed; this is its return value.
    Joined(usize),
    /// The thread is still running; sleep on the channel and retry.
    Block(WaitChannel),
}

impl<A: Arch, S: Scheduler> ProcTable<A, S> {
    /// Start a thread in `caller`'s address space.
    ///
    /// The thread gets the lowest free stack slot of the space owner, runs
    /// `entry(arg)` and is a child of `caller`. Nothing is left behind if
    /// any step fails.
    pub fn thread_create<P: Platform + ?Sized>(
        &mut self,
        platform: &P,
        caller: Pid,
        entry: usize,
        arg: usize,
    ) -> KernelResult<Pid> {
        let caller_index = self.live_index(caller)?;
        let binding = self.procs[caller_index].binding;
        let (Some(owner), Some(space)) = (binding.owner(caller), binding.space()) else {
            return Err(InvalidOperationError::NoAddressSpace(caller).into());
        };
        let owner_index = self.live_index(owner)?;

        let owner_size = self.procs[owner_index].size;
        let slots = self.procs[owner_index]
            .threads
            .get_or_insert_with(|| StackSlots::new(owner_size));
        let placed = slots
            .claim(owner_size)
            .and_then(|slot| Some((slot, slots.region(slot)?)));
        let Some((slot, (stack_base, stack_end))) = placed else {
            log::warn!("thread: pid {} has no free stack slot", owner);
            return Err(MemoryError::ThreadSlotsExhausted.into());
        };

        let tid = match self.alloc() {
            Ok(tid) => tid,
            Err(err) => {
                self.release_stack_slot(platform, owner, slot);
                return Err(err.into());
            }
        };

        if stack_end > owner_size {
            match platform.grow(space, owner_size, stack_end) {
                Some(size) => self.procs[owner_index].size = size,
                None => {
                    self.release_slot(tid.slot());
                    self.release_stack_slot(platform, owner, slot);
                    log::warn!("thread: cannot map stack slot {} of pid {}", slot, owner);
                    return Err(MemoryError::GrowFailed { from: owner_size, to: stack_end }.into());
                }
            }
        }
        platform.clear_user(space, stack_base);

        let mut frame = [0u8; 2 * size_of::<usize>()];
        let (ret, argument) = frame.split_at_mut(size_of::<usize>());
        ret.copy_from_slice(&FAKE_RETURN_PC.to_ne_bytes());
        argument.copy_from_slice(&arg.to_ne_bytes());
        let sp = stack_end - frame.len();
        if let Err(err) = platform.copy_out(space, sp, &frame) {
            self.release_slot(tid.slot());
            self.release_stack_slot(platform, owner, slot);
            return Err(err.into());
        }

        let source = &self.procs[caller_index];
        let mut trap_frame = source.trap_frame.clone();
        A::set_user_entry(&mut trap_frame, entry, sp);
        let files = source.files.duplicate(platform);
        let cwd = source.cwd.map(|inode| platform.idup(inode));
        let name = source.name.clone();

        let unit = &mut self.procs[tid.slot()];
        unit.binding = AddressBinding::SharesWith { owner, space };
        unit.parent = Some(caller);
        unit.trap_frame = trap_frame;
        unit.files = files;
        unit.cwd = cwd;
        unit.set_name(&name);
        unit.stack_slot = Some(slot);
        unit.state = ProcState::Runnable;

        log::debug!("thread: pid {} created thread {} in slot {}", caller, tid, slot);
        Ok(tid)
    }

    /// Finish thread `tid` with `retval`.
    ///
    /// Files and the working directory are released, the parent and the
    /// owner's parent are woken, and children go to init. The thread stays
    /// a Zombie until it is joined. The caller decides whether to switch
    /// away afterwards.
    pub fn finish_thread<P: Platform + ?Sized>(&mut self, platform: &P, tid: Pid, retval: usize) -> KernelResult<()> {
        let index = self.live_index(tid)?;
        let unit = &mut self.procs[index];
        let AddressBinding::SharesWith { owner, .. } = unit.binding else {
            return Err(JoinError::NoSuchThread(tid).into());
        };
        if unit.state == ProcState::Zombie {
            return Ok(());
        }

        unit.retval = Some(retval);
        unit.files.close_all(platform);
        if let Some(cwd) = unit.cwd.take() {
            platform.iput(cwd);
        }
        unit.chan = None;
        let parent = unit.parent;

        if let Some(parent) = parent {
            self.wakeup(WaitChannel::Unit(parent));
        }
        if let Some(grandparent) = self.get(owner).and_then(|owner| owner.parent) {
            self.wakeup(WaitChannel::Unit(grandparent));
        }
        self.reparent_children(tid, |_, _| true);

        self.procs[index].state = ProcState::Zombie;
        log::debug!("thread: {} exited with {:#x}", tid, retval);
        Ok(())
    }

    /// Try to reclaim thread `tid` on behalf of `caller`.
    ///
    /// In [`JoinMode::Child`] only the thread's parent may join it. Joining
    /// gives back the kernel stack and the stack slot and shrinks the owner
    /// to the highest slot still in use.
    pub fn thread_join<P: Platform + ?Sized>(
        &mut self,
        platform: &P,
        caller: Pid,
        tid: Pid,
        mode: JoinMode,
    ) -> KernelResult<JoinStep> {
        let caller_index = self.live_index(caller)?;

        let joinable = self.get(tid).map_or(false, |unit| {
            unit.binding.is_thread() && (mode == JoinMode::Emergency || unit.parent == Some(caller))
        });
        if !joinable {
            return Err(JoinError::NoSuchThread(tid).into());
        }

        if self.procs[tid.slot()].state == ProcState::Zombie {
            let retval = self.reclaim_thread(platform, tid);
            return Ok(JoinStep::Joined(retval));
        }
        if self.procs[caller_index].killed {
            return Err(JoinError::Killed.into());
        }
        Ok(JoinStep::Block(WaitChannel::Unit(caller)))
    }

    /// Reclaim a zombie thread and return its exit value.
    pub(crate) fn reclaim_thread<P: Platform + ?Sized>(&mut self, platform: &P, tid: Pid) -> usize {
        let index = tid.slot();
        let unit = &mut self.procs[index];
        if unit.state != ProcState::Zombie {
            panic!("reclaim of thread {} in state {:?}", tid, unit.state);
        }
        let AddressBinding::SharesWith { owner, .. } = unit.binding else {
            panic!("reclaim of pid {} as a thread", tid);
        };
        let retval = unit.retval.take().unwrap_or(0);
        let slot = unit.stack_slot.take();

        self.release_slot(index);
        if let Some(slot) = slot {
            self.release_stack_slot(platform, owner, slot);
        }
        log::debug!("thread: joined {} (retval {:#x})", tid, retval);
        retval
    }

    /// Give a stack slot back to `owner` and shrink its space by the free
    /// stack regions left at the top.
    fn release_stack_slot<P: Platform + ?Sized>(&mut self, platform: &P, owner: Pid, slot: usize) {
        let unit = &mut self.procs[owner.slot()];
        let Some(slots) = unit.threads.as_mut() else {
            panic!("pid {} has no thread stack slots", owner);
        };
        let target = slots.release(slot, unit.size);
        if slots.in_use() == 0 {
            unit.threads = None;
        }

        if target < unit.size {
            if let AddressBinding::Owns(space) = unit.binding {
                unit.size = platform.shrink(space, unit.size, target);
            }
        }
    }
}
