//! Rendering of run results

mod formatter;

pub use formatter::{write_report, OutputFormat, ResultFormatter};
