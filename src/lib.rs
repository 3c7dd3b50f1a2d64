#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Process and thread scheduling core for a small teaching kernel.
//!
//! The crate keeps the process table and decides, on every CPU, which unit
//! of execution runs next. Two policies are composed into one dispatch loop:
//!
//! - **Stride scheduling** for units that reserved a percentage of the CPU
//!   (at most 80% in total)
//! - **A three-level MLFQ** for everything else; the MLFQ pool takes part in
//!   the stride competition with whatever share is left
//!
//! On top of the table the crate implements lightweight threads that share
//! the address space of the unit that created them.
//!
//! # Features
//!
//! - `std-shim`: Drop the bare-metal panic handler for host tooling
//!
//! # Quick Start
//!
//! ```ignore
//! use stride_mlfq::{Kernel, Syscall};
//!
//! static KERNEL: spin::Lazy<Kernel<MyArch, MyPlatform>> =
//!     spin::Lazy::new(|| Kernel::new(MyPlatform::new(), NCPU));
//!
//! fn kernel_main(cpu: usize) -> ! {
//!     if cpu == 0 {
//!         KERNEL.user_init(INITCODE);
//!     }
//!     KERNEL.scheduler(cpu)
//! }
//!
//! fn trap(cpu: usize, call: Syscall) -> isize {
//!     KERNEL.syscall(cpu, call)
//! }
//! ```
//!
//! # Collaborators
//!
//! The core never touches page tables, files or registers itself:
//! - [`VirtualMemory`] creates, resizes and destroys address spaces
//! - [`FileOps`] takes and drops references on files and inodes
//! - [`Arch`] switches kernel contexts and builds user trap frames

// Core modules
pub mod arch;
pub mod config;
pub mod errors;
pub mod fs;
pub mod kernel;
pub mod mem;
pub mod platform;
pub mod sched;
pub mod syscall;
pub mod thread;
pub mod time;

#[cfg(test)]
extern crate std;

extern crate alloc;

#[cfg(test)]
mod tests;

// Panic handler for bare-metal
#[cfg(all(not(test), not(feature = "std-shim"), target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std-shim"), target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log::error!("kernel panic: {}", info);
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, NoOpArch};

// Configuration
pub use config::SchedConfig;

// Kernel
pub use kernel::Kernel;
pub use syscall::Syscall;

// Scheduler
pub use sched::{Affiliation, HybridScheduler, Mlfq, Scheduler, StrideTable};

// Execution units
pub use thread::{AddressBinding, JoinMode, Pid, ProcState, ProcTable, WaitChannel};

// Collaborators
pub use fs::{FileHandle, FileOps, InodeHandle};
pub use mem::{AddressSpace, VirtualMemory};
pub use platform::Platform;

// Time
pub use time::{TickCounter, Ticks};

// Errors
pub use errors::{KernelError, KernelResult, ShareError, SpawnError};
