//! Error handling for the scheduling core.
//!
//! Recoverable conditions (admission rejection, resource exhaustion, missing
//! children) are reported through these types and end up as the `-1`
//! sentinel at the syscall boundary. Invariant violations are not errors:
//! they panic and halt the kernel.

#![allow(clippy::uninlined_format_args)]

use crate::thread::Pid;
use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Top-level error type for every fallible kernel operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Execution unit allocation errors
    Spawn(SpawnError),
    /// Process reaping errors
    Wait(WaitError),
    /// Thread joining errors
    Join(JoinError),
    /// CPU share admission errors
    Share(ShareError),
    /// Address-space errors
    Memory(MemoryError),
    /// Invalid operation errors
    InvalidOperation(InvalidOperationError),
}

/// Errors that can occur while allocating an execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    /// Every table slot is in use
    TableFull,
    /// No kernel stack available
    OutOfMemory,
}

/// Errors returned by `wait`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// Caller has no children to wait for
    NoChildren,
    /// Caller was killed while waiting
    Killed,
}

/// Errors returned by `thread_join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No joinable thread with this identifier
    NoSuchThread(Pid),
    /// Caller was killed while waiting
    Killed,
}

/// Reasons a CPU share reservation is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    /// A share of zero percent was requested
    InvalidShare(u32),
    /// The identifier has no stride table entry
    PidOutOfRange(Pid),
    /// Granting the share would push the reserved total over the ceiling
    CeilingExceeded { requested: u32, available: u32 },
}

/// Address-space errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Creating or duplicating an address space failed
    OutOfMemory,
    /// Growing an address space failed
    GrowFailed { from: usize, to: usize },
    /// Copying into user memory failed
    CopyOutFailed(usize),
    /// Every thread stack slot of the address space is taken
    ThreadSlotsExhausted,
}

/// Invalid operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperationError {
    /// No execution unit is running on the CPU
    NoCurrentUnit(usize),
    /// The identifier does not name a live execution unit
    NoSuchUnit(Pid),
    /// The unit has no address space
    NoAddressSpace(Pid),
    /// A raw identifier that cannot name any unit
    InvalidPid(usize),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Spawn(e) => write!(f, "Spawn error: {}", e),
            KernelError::Wait(e) => write!(f, "Wait error: {}", e),
            KernelError::Join(e) => write!(f, "Thread join error: {}", e),
            KernelError::Share(e) => write!(f, "CPU share rejected: {}", e),
            KernelError::Memory(e) => write!(f, "Memory error: {}", e),
            KernelError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TableFull => write!(f, "Process table is full"),
            SpawnError::OutOfMemory => write!(f, "Out of memory for kernel stack"),
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::NoChildren => write!(f, "No children to wait for"),
            WaitError::Killed => write!(f, "Killed while waiting"),
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::NoSuchThread(tid) => write!(f, "No such thread: {}", tid),
            JoinError::Killed => write!(f, "Killed while joining"),
        }
    }
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::InvalidShare(share) => write!(f, "Invalid share: {}%", share),
            ShareError::PidOutOfRange(pid) => write!(f, "Pid {} has no stride slot", pid),
            ShareError::CeilingExceeded { requested, available } => {
                write!(f, "Requested {}% but only {}% is left", requested, available)
            }
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfMemory => write!(f, "Out of memory"),
            MemoryError::GrowFailed { from, to } => {
                write!(f, "Cannot grow address space from {:#x} to {:#x}", from, to)
            }
            MemoryError::CopyOutFailed(va) => write!(f, "Copy out to {:#x} failed", va),
            MemoryError::ThreadSlotsExhausted => write!(f, "Thread stack slots exhausted"),
        }
    }
}

impl fmt::Display for InvalidOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidOperationError::NoCurrentUnit(cpu) => write!(f, "Nothing running on CPU {}", cpu),
            InvalidOperationError::NoSuchUnit(pid) => write!(f, "No such unit: {}", pid),
            InvalidOperationError::NoAddressSpace(pid) => write!(f, "Unit {} has no address space", pid),
            InvalidOperationError::InvalidPid(raw) => write!(f, "Invalid pid: {}", raw),
        }
    }
}

// Conversion implementations for ergonomic error handling

impl From<SpawnError> for KernelError {
    fn from(error: SpawnError) -> Self {
        KernelError::Spawn(error)
    }
}

impl From<WaitError> for KernelError {
    fn from(error: WaitError) -> Self {
        KernelError::Wait(error)
    }
}

impl From<JoinError> for KernelError {
    fn from(error: JoinError) -> Self {
        KernelError::Join(error)
    }
}

impl From<ShareError> for KernelError {
    fn from(error: ShareError) -> Self {
        KernelError::Share(error)
    }
}

impl From<MemoryError> for KernelError {
    fn from(error: MemoryError) -> Self {
        KernelError::Memory(error)
    }
}

impl From<InvalidOperationError> for KernelError {
    fn from(error: InvalidOperationError) -> Self {
        KernelError::InvalidOperation(error)
    }
}

impl KernelError {
    /// Sentinel value reported to user space for any recoverable failure.
    pub const SYSCALL_FAILURE: isize = -1;

    /// Create a no-such-unit error.
    pub fn no_such_unit(pid: Pid) -> Self {
        KernelError::InvalidOperation(InvalidOperationError::NoSuchUnit(pid))
    }

    /// Whether the error comes from an exhausted resource rather than bad input.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            KernelError::Spawn(SpawnError::TableFull | SpawnError::OutOfMemory)
                | KernelError::Memory(
                    MemoryError::OutOfMemory
                        | MemoryError::GrowFailed { .. }
                        | MemoryError::ThreadSlotsExhausted
                )
        )
    }
}
