//! Scenario execution engine

mod runner;

pub use runner::{classify, RunOptions, ScenarioRunner};
