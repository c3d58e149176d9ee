//! Scenario replay for the `fintrack-replay` binary.

pub mod scenario;

pub use scenario::{EntryRef, Report, Scenario, Step, StepOutcome, replay};
