//! Scenario identifiers, results and run summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every scenario the suite knows how to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCase {
    BasicRouting,
    UnsupportedGeocode,
    SigningKeyRevocation,
    AnonymousPriority,
    RateLimitEnforcement,
    TlsPolicyAcceptance,
    CustomAuthorino,
}

impl ScenarioCase {
    /// Scenario number (1-7)
    pub fn number(&self) -> u8 {
        match self {
            ScenarioCase::BasicRouting => 1,
            ScenarioCase::UnsupportedGeocode => 2,
            ScenarioCase::SigningKeyRevocation => 3,
            ScenarioCase::AnonymousPriority => 4,
            ScenarioCase::RateLimitEnforcement => 5,
            ScenarioCase::TlsPolicyAcceptance => 6,
            ScenarioCase::CustomAuthorino => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioCase::BasicRouting => "Basic Routing",
            ScenarioCase::UnsupportedGeocode => "Unsupported Geocode",
            ScenarioCase::SigningKeyRevocation => "Signing Key Revocation",
            ScenarioCase::AnonymousPriority => "Anonymous Priority",
            ScenarioCase::RateLimitEnforcement => "Rate Limit",
            ScenarioCase::TlsPolicyAcceptance => "TLS Policy",
            ScenarioCase::CustomAuthorino => "Custom Authorino",
        }
    }

    /// Command line spelling, e.g. `basic-routing`
    pub fn slug(&self) -> String {
        self.name().to_lowercase().replace(' ', "-")
    }

    pub fn category(&self) -> &'static str {
        match self {
            ScenarioCase::BasicRouting => "Gateway",
            ScenarioCase::UnsupportedGeocode | ScenarioCase::TlsPolicyAcceptance => "Control plane",
            ScenarioCase::SigningKeyRevocation
            | ScenarioCase::AnonymousPriority
            | ScenarioCase::CustomAuthorino => "Authorino",
            ScenarioCase::RateLimitEnforcement => "Limitador",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioCase::BasicRouting => "GET /get through a fresh gateway and route returns 200",
            ScenarioCase::UnsupportedGeocode => {
                "Geo code XX on a DNSPolicy is reported as a provider error"
            }
            ScenarioCase::SigningKeyRevocation => {
                "Tokens signed after the RS256 key is revoked are rejected"
            }
            ScenarioCase::AnonymousPriority => {
                "OIDC identity is evaluated before a lower priority anonymous identity"
            }
            ScenarioCase::RateLimitEnforcement => "Requests over the limit get 429",
            ScenarioCase::TlsPolicyAcceptance => {
                "TLSPolicy is accepted and the gateway certificate is issued"
            }
            ScenarioCase::CustomAuthorino => "Authorino deployed by the operator becomes ready",
        }
    }

    /// Whether the scenario needs Kuadrant installed on the cluster
    pub fn needs_kuadrant(&self) -> bool {
        !matches!(self, ScenarioCase::BasicRouting)
    }

    pub fn all() -> Vec<ScenarioCase> {
        vec![
            ScenarioCase::BasicRouting,
            ScenarioCase::UnsupportedGeocode,
            ScenarioCase::SigningKeyRevocation,
            ScenarioCase::AnonymousPriority,
            ScenarioCase::RateLimitEnforcement,
            ScenarioCase::TlsPolicyAcceptance,
            ScenarioCase::CustomAuthorino,
        ]
    }

    pub fn from_number(n: u8) -> Option<ScenarioCase> {
        Self::all().into_iter().find(|case| case.number() == n)
    }

    /// Accepts a number or the slug
    pub fn parse(value: &str) -> Option<ScenarioCase> {
        if let Ok(n) = value.parse::<u8>() {
            return Self::from_number(n);
        }
        let value = value.to_lowercase().replace('_', "-");
        Self::all().into_iter().find(|case| case.slug() == value)
    }
}

impl fmt::Display for ScenarioCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scenario {}: {}", self.number(), self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    Pass,
    /// An expectation did not hold
    Fail,
    /// Prerequisites missing
    Skip,
    /// The scenario could not be carried out
    Error,
}

impl ScenarioStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            ScenarioStatus::Pass => "✓",
            ScenarioStatus::Fail => "✗",
            ScenarioStatus::Skip => "○",
            ScenarioStatus::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioStatus::Pass)
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioStatus::Pass => write!(f, "PASS"),
            ScenarioStatus::Fail => write!(f, "FAIL"),
            ScenarioStatus::Skip => write!(f, "SKIP"),
            ScenarioStatus::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioCase,
    pub status: ScenarioStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
    /// Observations collected while running
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Cleanup actions that failed afterwards
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<String>,
}

impl ScenarioResult {
    fn new(scenario: ScenarioCase, status: ScenarioStatus, duration_ms: u64) -> Self {
        Self {
            scenario,
            status,
            duration_ms,
            message: None,
            details: Vec::new(),
            cleanup_errors: Vec::new(),
        }
    }

    pub fn pass(scenario: ScenarioCase, duration_ms: u64) -> Self {
        Self::new(scenario, ScenarioStatus::Pass, duration_ms)
    }

    pub fn fail(scenario: ScenarioCase, duration_ms: u64, message: impl Into<String>) -> Self {
        Self::new(scenario, ScenarioStatus::Fail, duration_ms).with_message(message)
    }

    pub fn skip(scenario: ScenarioCase, reason: impl Into<String>) -> Self {
        Self::new(scenario, ScenarioStatus::Skip, 0).with_message(reason)
    }

    pub fn error(scenario: ScenarioCase, duration_ms: u64, error: impl Into<String>) -> Self {
        Self::new(scenario, ScenarioStatus::Error, duration_ms).with_message(error)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_cleanup_errors(mut self, errors: Vec<String>) -> Self {
        self.cleanup_errors = errors;
        self
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.scenario,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Outcome of one invocation of the suite
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Label every object of the run carries
    pub run_label: String,
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl RunSummary {
    pub fn new(
        run_label: impl Into<String>,
        project: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<ScenarioResult>,
    ) -> Self {
        let count = |status: ScenarioStatus| results.iter().filter(|r| r.status == status).count();

        Self {
            run_label: run_label.into(),
            project: project.into(),
            started_at,
            completed_at: Utc::now(),
            total: results.len(),
            passed: count(ScenarioStatus::Pass),
            failed: count(ScenarioStatus::Fail),
            skipped: count(ScenarioStatus::Skip),
            errors: count(ScenarioStatus::Error),
            total_duration_ms: results.iter().map(|r| r.duration_ms).sum(),
            results,
        }
    }

    /// Share of executed (not skipped) scenarios that passed
    pub fn pass_rate(&self) -> f64 {
        let executed = self.total - self.skipped;
        if executed == 0 {
            0.0
        } else {
            (self.passed as f64 / executed as f64) * 100.0
        }
    }

    /// No failures and no errors; skips are fine
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {} in project {}", self.run_label, self.project)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_numbers() {
        assert_eq!(ScenarioCase::BasicRouting.number(), 1);
        assert_eq!(ScenarioCase::CustomAuthorino.number(), 7);
        for (i, case) in ScenarioCase::all().into_iter().enumerate() {
            assert_eq!(case.number() as usize, i + 1);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!(ScenarioCase::parse("3"), Some(ScenarioCase::SigningKeyRevocation));
        assert_eq!(ScenarioCase::parse("basic-routing"), Some(ScenarioCase::BasicRouting));
        assert_eq!(ScenarioCase::parse("Rate_Limit"), Some(ScenarioCase::RateLimitEnforcement));
        assert_eq!(ScenarioCase::parse("8"), None);
        assert_eq!(ScenarioCase::parse("nope"), None);
    }

    #[test]
    fn test_only_routing_runs_standalone() {
        let standalone: Vec<_> = ScenarioCase::all()
            .into_iter()
            .filter(|case| !case.needs_kuadrant())
            .collect();
        assert_eq!(standalone, vec![ScenarioCase::BasicRouting]);
    }

    #[test]
    fn test_run_summary() {
        let results = vec![
            ScenarioResult::pass(ScenarioCase::BasicRouting, 100),
            ScenarioResult::fail(ScenarioCase::UnsupportedGeocode, 50, "still enforced"),
            ScenarioResult::skip(ScenarioCase::SigningKeyRevocation, "Keycloak is not configured"),
        ];

        let summary = RunSummary::new("testrun-abc12345", "kuadrant", Utc::now(), results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_duration_ms, 150);
        assert_eq!(summary.pass_rate(), 50.0);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_skips_do_not_fail_the_run() {
        let results = vec![
            ScenarioResult::pass(ScenarioCase::BasicRouting, 10),
            ScenarioResult::skip(ScenarioCase::CustomAuthorino, "disabled"),
        ];
        let summary = RunSummary::new("testrun-x", "kuadrant", Utc::now(), results);
        assert!(summary.is_success());
    }
}
