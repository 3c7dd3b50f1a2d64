//! Memory bookkeeping owned by the scheduling core.
//!
//! Kernel stacks come from a recycling pool; user address spaces belong to
//! the virtual-memory collaborator and are only referred to by handle.

pub mod slots;
pub mod stack_pool;
pub mod vm;

pub use slots::StackSlots;
pub use stack_pool::{KernelStack, KernelStackPool};
pub use vm::{pg_round_up, AddressSpace, VirtualMemory};
