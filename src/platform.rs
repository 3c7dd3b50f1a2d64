//! The collaborators a kernel is built on, as one bound.

use crate::fs::FileOps;
use crate::mem::vm::VirtualMemory;

/// Everything the scheduling core needs from the rest of the kernel besides
/// the CPU itself.
pub trait Platform: VirtualMemory + FileOps + Send + Sync {}

impl<T: VirtualMemory + FileOps + Send + Sync> Platform for T {}
