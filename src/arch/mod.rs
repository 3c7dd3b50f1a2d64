//! Architecture abstraction layer for context switching and trap frames.
//!
//! The scheduling core never touches registers itself. Everything it needs
//! from the CPU goes through this trait: saving and restoring the kernel
//! context of a unit, building the user entry frame of a new unit, and
//! masking interrupts while the table lock is held.

/// Architecture abstraction trait.
///
/// This trait must be implemented for each supported CPU architecture to provide
/// context switching, trap-frame construction and interrupt control.
///
/// # Safety
///
/// Implementations of this trait involve direct hardware manipulation and
/// inline assembly. All methods marked as unsafe have specific preconditions
/// that must be upheld by the caller.
pub trait Arch {
    /// Architecture-specific saved kernel context.
    ///
    /// This type must contain all callee-saved registers needed to resume a
    /// unit inside the kernel.
    type SavedContext: Send + Default;

    /// Architecture-specific user trap frame.
    ///
    /// A forked unit starts from a copy of its parent's frame; a thread starts
    /// from a copy whose program counter and stack pointer were replaced.
    type TrapFrame: Send + Clone + Default;

    /// Switch from one kernel context to another.
    ///
    /// # Safety
    ///
    /// - `prev` must point to a valid, properly aligned SavedContext
    /// - `next` must point to a valid, properly aligned SavedContext
    /// - The caller must ensure the memory pointed to by both pointers remains
    ///   valid for the duration of this call
    /// - Must be called with interrupts disabled and the table lock held
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Point a trap frame at a user entry point and stack.
    fn set_user_entry(frame: &mut Self::TrapFrame, entry: usize, stack_pointer: usize);

    /// Set the value a trap frame returns to user space (fork's child gets 0).
    fn set_return_value(frame: &mut Self::TrapFrame, value: usize);

    /// Enable interrupts on the current CPU.
    fn enable_interrupts();

    /// Disable interrupts on the current CPU.
    ///
    /// The table lock is only ever taken with interrupts masked, so a timer
    /// interrupt cannot re-enter the scheduler on the same CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;
}

/// Trap frame used by [`NoOpArch`]: just the registers the core writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoOpTrapFrame {
    pub pc: usize,
    pub sp: usize,
    pub ret: usize,
}

/// A no-op architecture implementation for host testing.
///
/// Context switches return immediately and interrupts always read as
/// disabled. It should not be used where real context switching is required.
pub struct NoOpArch;

impl Arch for NoOpArch {
    type SavedContext = ();
    type TrapFrame = NoOpTrapFrame;

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {
        // No-op for testing
    }

    fn set_user_entry(frame: &mut Self::TrapFrame, entry: usize, stack_pointer: usize) {
        frame.pc = entry;
        frame.sp = stack_pointer;
    }

    fn set_return_value(frame: &mut Self::TrapFrame, value: usize) {
        frame.ret = value;
    }

    fn enable_interrupts() {
        // No-op for testing
    }

    fn disable_interrupts() {
        // No-op for testing
    }

    fn interrupts_enabled() -> bool {
        false
    }
}
