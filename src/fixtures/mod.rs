//! Per-run fixtures: object naming, cleanup and scenario topology

mod blame;
mod context;
mod finalizers;

pub use blame::Blame;
pub use context::TestContext;
pub use finalizers::Finalizers;
