//! Output formatters for scenario results
//!
//! Table, JSON, CSV and one-line summary renderings of a run.

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

use crate::models::{RunSummary, ScenarioResult, ScenarioStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "csv" => Ok(OutputFormat::Csv),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!(
                "unknown format '{other}', expected table, json, json-pretty, csv or summary"
            )),
        }
    }
}

pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn status_label(&self, status: ScenarioStatus) -> String {
        let plain = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return plain;
        }
        let color = match status {
            ScenarioStatus::Pass => "32",
            ScenarioStatus::Skip => "33",
            ScenarioStatus::Fail | ScenarioStatus::Error => "31",
        };
        format!("\x1b[{color}m{plain}\x1b[0m")
    }

    fn format_result_table(&self, result: &ScenarioResult) -> String {
        format!(
            "{:2}. {:24} {:8} [{:>7}ms]",
            result.scenario.number(),
            result.scenario.name(),
            self.status_label(result.status),
            result.duration_ms
        )
    }

    pub fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary)?,
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary)?,
            OutputFormat::Csv => csv_rows(&summary.results)?,
            OutputFormat::Summary => format!(
                "Run {}: {}/{} passed, {} skipped ({:.1}%) in {}ms",
                summary.run_label,
                summary.passed,
                summary.total,
                summary.skipped,
                summary.pass_rate(),
                summary.total_duration_ms
            ),
        })
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Run {:24} project {:22} ║\n",
            summary.run_label, summary.project
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&format!("║  {}\n", self.format_result_table(result)));
            if result.status != ScenarioStatus::Pass {
                if let Some(message) = &result.message {
                    output.push_str(&format!("║      {message}\n"));
                }
            }
            for cleanup in &result.cleanup_errors {
                output.push_str(&format!("║      cleanup failed: {cleanup}\n"));
            }
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Total: {:2} | Pass: {:2} | Fail: {:2} | Skip: {:2} | Error: {:2}\n",
            summary.total, summary.passed, summary.failed, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {}ms\n",
            summary.pass_rate(),
            summary.total_duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn csv_rows(results: &[ScenarioResult]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(["number", "scenario", "status", "duration_ms", "message"])?;
    for result in results {
        writer.write_record([
            result.scenario.number().to_string(),
            result.scenario.name().to_string(),
            result.status.to_string(),
            result.duration_ms.to_string(),
            result.message.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

/// Write the run to `path`; JSON unless the extension says CSV
pub fn write_report(path: impl AsRef<Path>, summary: &RunSummary) -> Result<()> {
    let path = path.as_ref();
    let format = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => OutputFormat::Csv,
        _ => OutputFormat::JsonPretty,
    };
    let content = ResultFormatter::new(format).no_color().format_summary(summary)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScenarioCase;
    use chrono::Utc;

    fn summary() -> RunSummary {
        RunSummary::new(
            "testrun-abc12345",
            "kuadrant",
            Utc::now(),
            vec![
                ScenarioResult::pass(ScenarioCase::BasicRouting, 120),
                ScenarioResult::fail(ScenarioCase::RateLimitEnforcement, 80, "expected 429, got 200"),
            ],
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("TABLE".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("unknown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_table_shows_failure_message() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_summary(&summary())
            .unwrap();
        assert!(output.contains("Basic Routing"));
        assert!(output.contains("✗ FAIL"));
        assert!(output.contains("expected 429, got 200"));
    }

    #[test]
    fn test_csv_quotes_messages() {
        let output = ResultFormatter::new(OutputFormat::Csv)
            .format_summary(&summary())
            .unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "number,scenario,status,duration_ms,message");
        assert_eq!(lines[1], "1,Basic Routing,PASS,120,");
        assert_eq!(lines[2], "5,Rate Limit,FAIL,80,\"expected 429, got 200\"");
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        write_report(&path, &summary()).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["run_label"], "testrun-abc12345");
        assert_eq!(written["results"][1]["status"], "fail");
        assert_eq!(written["results"][1]["scenario"], "rate_limit_enforcement");
    }
}
