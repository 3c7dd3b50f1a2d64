//! Execution units: processes and the threads that share their address space.
//!
//! Every unit lives in a fixed slot of the [`ProcTable`]. Its identifier is
//! derived from the slot, so identifiers are reused once a unit has been
//! reclaimed.

use crate::arch::Arch;
use crate::config::MAX_NAME_LEN;
use crate::fs::{InodeHandle, OpenFiles};
use crate::mem::{AddressSpace, KernelStack, StackSlots};
use core::fmt;
use core::num::NonZeroUsize;

extern crate alloc;
use alloc::string::String;

pub mod lifecycle;
pub mod table;

pub use lifecycle::{JoinMode, JoinStep};
pub use table::{ProcTable, WaitStep};

/// Identifier of an execution unit.
///
/// Identifiers are never zero. The unit in table slot `n` is always `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(NonZeroUsize);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Pid {
    /// Create an identifier from its raw value. Returns `None` for zero.
    pub fn new(id: usize) -> Option<Self> {
        NonZeroUsize::new(id).map(Self)
    }

    /// Identifier of the unit stored in table slot `slot`.
    pub fn from_slot(slot: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(slot))
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Table slot holding this unit.
    pub fn slot(self) -> usize {
        self.0.get() - 1
    }
}

/// Lifecycle state of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl ProcState {
    /// Fixed-width name printed by the process dump.
    pub fn name(self) -> &'static str {
        match self {
            ProcState::Unused => "unused",
            ProcState::Embryo => "embryo",
            ProcState::Sleeping => "sleep ",
            ProcState::Runnable => "runble",
            ProcState::Running => "run   ",
            ProcState::Zombie => "zombie",
        }
    }

    /// Whether the slot holds a unit that has not been reclaimed.
    pub fn is_live(self) -> bool {
        self != ProcState::Unused
    }
}

/// How a unit relates to the address space it executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressBinding {
    /// No address space (free slot, or a unit still being built).
    #[default]
    Detached,
    /// The unit owns the space and destroys it when reaped.
    Owns(AddressSpace),
    /// A thread running in the space owned by `owner`.
    SharesWith { owner: Pid, space: AddressSpace },
}

impl AddressBinding {
    pub fn space(self) -> Option<AddressSpace> {
        match self {
            AddressBinding::Detached => None,
            AddressBinding::Owns(space) | AddressBinding::SharesWith { space, .. } => Some(space),
        }
    }

    /// Owner of the space, given the unit this binding belongs to.
    pub fn owner(self, me: Pid) -> Option<Pid> {
        match self {
            AddressBinding::Detached => None,
            AddressBinding::Owns(_) => Some(me),
            AddressBinding::SharesWith { owner, .. } => Some(owner),
        }
    }

    pub fn is_thread(self) -> bool {
        matches!(self, AddressBinding::SharesWith { .. })
    }
}

/// Key a sleeping unit waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitChannel {
    /// Children and joiners of a unit sleep on the unit itself.
    Unit(Pid),
    /// Sleepers waiting for the timer to advance.
    Ticks,
}

/// One slot of the process table.
pub struct Proc<A: Arch> {
    pub(crate) pid: Pid,
    pub(crate) state: ProcState,
    pub(crate) parent: Option<Pid>,
    pub(crate) binding: AddressBinding,
    /// Size of user memory in bytes. Threads read their owner's.
    pub(crate) size: usize,
    pub(crate) kstack: Option<KernelStack>,
    pub(crate) trap_frame: A::TrapFrame,
    pub(crate) context: A::SavedContext,
    pub(crate) chan: Option<WaitChannel>,
    pub(crate) killed: bool,
    pub(crate) files: OpenFiles,
    pub(crate) cwd: Option<InodeHandle>,
    pub(crate) name: String,
    /// Stack slots handed out to threads, kept by the space owner
    pub(crate) threads: Option<StackSlots>,
    /// Slot holding this thread's user stack
    pub(crate) stack_slot: Option<usize>,
    pub(crate) retval: Option<usize>,
}

impl<A: Arch> Proc<A> {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            pid: Pid::from_slot(slot),
            state: ProcState::Unused,
            parent: None,
            binding: AddressBinding::Detached,
            size: 0,
            kstack: None,
            trap_frame: A::TrapFrame::default(),
            context: A::SavedContext::default(),
            chan: None,
            killed: false,
            files: OpenFiles::new(),
            cwd: None,
            name: String::new(),
            threads: None,
            stack_slot: None,
            retval: None,
        }
    }

    /// Return the slot to its pristine state. The kernel stack must already
    /// have been handed back.
    pub(crate) fn reset(&mut self) {
        debug_assert!(self.kstack.is_none());
        let slot = self.pid.slot();
        *self = Self::new(slot);
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name.clear();
        let mut end = name.len().min(MAX_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name.push_str(&name[..end]);
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    pub fn parent(&self) -> Option<Pid> {
        self.parent
    }

    pub fn binding(&self) -> AddressBinding {
        self.binding
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trap_frame(&self) -> &A::TrapFrame {
        &self.trap_frame
    }

    pub fn trap_frame_mut(&mut self) -> &mut A::TrapFrame {
        &mut self.trap_frame
    }

    pub fn files(&self) -> &OpenFiles {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut OpenFiles {
        &mut self.files
    }

    pub fn cwd(&self) -> Option<InodeHandle> {
        self.cwd
    }

    /// Stack slots handed out to threads of this unit's address space.
    pub fn thread_slots(&self) -> Option<&StackSlots> {
        self.threads.as_ref()
    }

    pub fn stack_slot(&self) -> Option<usize> {
        self.stack_slot
    }
}

impl<A: Arch> fmt::Debug for Proc<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proc")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("binding", &self.binding)
            .field("size", &self.size)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;

    #[test]
    fn test_pid_slot_mapping() {
        let pid = Pid::from_slot(0);
        assert_eq!(pid.get(), 1);
        assert_eq!(pid.slot(), 0);
        assert_eq!(Pid::from_slot(41).get(), 42);
        assert!(Pid::new(0).is_none());
    }

    #[test]
    fn test_state_names_are_fixed_width() {
        for state in [
            ProcState::Unused,
            ProcState::Embryo,
            ProcState::Sleeping,
            ProcState::Runnable,
            ProcState::Running,
            ProcState::Zombie,
        ] {
            assert_eq!(state.name().len(), 6);
        }
    }

    #[test]
    fn test_binding_owner() {
        let me = Pid::new(5).unwrap();
        let owner = Pid::new(3).unwrap();
        let space = AddressSpace::new(0x1000).unwrap();

        assert_eq!(AddressBinding::Owns(space).owner(me), Some(me));
        let shared = AddressBinding::SharesWith { owner, space };
        assert_eq!(shared.owner(me), Some(owner));
        assert_eq!(shared.space(), Some(space));
        assert!(shared.is_thread());
        assert_eq!(AddressBinding::Detached.space(), None);
    }

    #[test]
    fn test_name_is_truncated() {
        let mut unit = Proc::<NoOpArch>::new(0);
        unit.set_name("a-rather-long-program-name");
        assert_eq!(unit.name(), "a-rather-long-pr");
        unit.reset();
        assert_eq!(unit.name(), "");
        assert_eq!(unit.pid().get(), 1);
    }
}
