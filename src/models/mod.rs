//! Scenario identifiers and results

mod scenario;

pub use scenario::{RunSummary, ScenarioCase, ScenarioResult, ScenarioStatus};
