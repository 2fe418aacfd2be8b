//! devrelay Test & Validation
//!
//! Cross-module relay scenarios and property-based tests, plus the small
//! harness they share.

pub mod harness;

#[cfg(test)]
mod proptest_relay;
#[cfg(test)]
mod relay_scenarios;

pub use harness::{counter_reducer, RelayHarness};
