//! Scheduling policies.
//!
//! Units without a reservation share the CPU through a three-level MLFQ.
//! Units that reserved a share are scheduled by stride, and the MLFQ pool
//! takes part in the stride competition as one more participant.

pub mod hybrid;
pub mod mlfq;
pub mod stride;
pub mod trait_def;

pub use hybrid::HybridScheduler;
pub use mlfq::Mlfq;
pub use stride::{StrideTable, Winner};
pub use trait_def::{Affiliation, Scheduler, UnitStates};

/// Default scheduler type.
pub type DefaultScheduler = HybridScheduler;
