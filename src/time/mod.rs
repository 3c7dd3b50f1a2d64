//! Timer collaborator: the monotonically increasing scheduler tick.
//!
//! The platform's timer interrupt bumps the counter once per scheduling
//! interval; the dispatch loop reads it before and after every context switch
//! to charge the elapsed ticks to the unit that ran.

pub mod tick;

pub use tick::TickCounter;

/// Scheduler ticks, as counted by [`TickCounter`].
pub type Ticks = u64;

/// Frequency in Hz for timer interrupts.
pub const TIMER_FREQUENCY_HZ: u32 = 100; // 10ms scheduling interval
