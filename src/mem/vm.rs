//! Virtual-memory collaborator.
//!
//! The core never walks page tables. It names address spaces by an opaque
//! [`AddressSpace`] handle and asks the platform to create, duplicate, resize
//! and destroy them.

use crate::config::PGSIZE;
use crate::errors::MemoryError;
use core::num::NonZeroUsize;

/// Opaque handle naming one address space (a page-directory root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressSpace(NonZeroUsize);

impl AddressSpace {
    /// Wrap a raw handle. Returns `None` for the null handle.
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Get the raw handle value.
    pub fn raw(self) -> usize {
        self.0.get()
    }
}

/// Address-space operations the platform provides.
///
/// Sizes are byte watermarks: user memory spans `0..size`.
pub trait VirtualMemory {
    /// Create an empty address space with the kernel mapped.
    fn create(&self) -> Option<AddressSpace>;

    /// Load the first user program into page 0 of `space`.
    fn load_init(&self, space: AddressSpace, image: &[u8]);

    /// Copy the first `size` bytes of user memory into a fresh address space.
    fn duplicate(&self, space: AddressSpace, size: usize) -> Option<AddressSpace>;

    /// Map user memory from `old_size` up to `new_size`.
    ///
    /// Returns the new size, or `None` if a page could not be allocated; on
    /// failure nothing stays mapped.
    fn grow(&self, space: AddressSpace, old_size: usize, new_size: usize) -> Option<usize>;

    /// Unmap user memory from `new_size` up to `old_size`, returning the new size.
    fn shrink(&self, space: AddressSpace, old_size: usize, new_size: usize) -> usize;

    /// Free every user page and the page directory itself.
    fn destroy(&self, space: AddressSpace);

    /// Make the page at `va` inaccessible from user mode (stack guard page).
    fn clear_user(&self, space: AddressSpace, va: usize);

    /// Copy `bytes` to user address `va` of `space`.
    fn copy_out(&self, space: AddressSpace, va: usize, bytes: &[u8]) -> Result<(), MemoryError>;
}

/// Round `size` up to the next page boundary.
pub const fn pg_round_up(size: usize) -> usize {
    (size + PGSIZE - 1) & !(PGSIZE - 1)
}

/// Round `size` down to a page boundary.
pub const fn pg_round_down(size: usize) -> usize {
    size & !(PGSIZE - 1)
}
