//! Crate-level tests that drive several modules together.

pub mod helpers;

mod property;
