//! Scenario execution
//!
//! Scenarios run one after another. Each gets its own [`TestContext`], torn
//! down before the next one starts unless the run keeps its objects.

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::Error;
use crate::fixtures::{Blame, TestContext};
use crate::k8s::KubeCluster;
use crate::models::{RunSummary, ScenarioCase, ScenarioResult};
use crate::policy::KuadrantCr;
use crate::scenarios::{self, Failure};
use crate::utils::Timer;

/// Switches of a single run
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Do not look for Kuadrant; scenarios needing it are skipped
    pub standalone: bool,
    /// Leave created objects in the cluster
    pub keep: bool,
    /// Fail instead of skipping on missing configuration
    pub enforce: bool,
}

pub struct ScenarioRunner<'s> {
    settings: &'s Settings,
    cluster: KubeCluster,
    blame: Blame,
    options: RunOptions,
}

impl<'s> ScenarioRunner<'s> {
    pub fn new(settings: &'s Settings, cluster: KubeCluster, options: RunOptions) -> Self {
        Self {
            blame: Blame::new(settings.run_prefix.as_deref()),
            settings,
            cluster,
            options,
        }
    }

    /// Label carried by every object of this run
    pub fn run_label(&self) -> &str {
        self.blame.label()
    }

    /// Kuadrant installed in the system project, unless running standalone
    async fn kuadrant(&self) -> Result<Option<KuadrantCr>> {
        if self.options.standalone {
            return Ok(None);
        }
        let system = self
            .cluster
            .change_project(&self.settings.service_protection.system_project);
        let kuadrant = KuadrantCr::find(&system).await?;
        if let Some(kuadrant) = &kuadrant {
            if !kuadrant.is_ready() {
                warn!("Kuadrant {} does not report Ready=True", kuadrant.name());
            }
        }
        Ok(kuadrant)
    }

    pub async fn run_scenario(&self, case: ScenarioCase) -> ScenarioResult {
        info!("Running {}", case);
        let timer = Timer::start(case.name());

        let kuadrant = match self.kuadrant().await {
            Ok(kuadrant) => kuadrant,
            Err(e) => {
                error!("Unable to look up Kuadrant: {:#}", e);
                return ScenarioResult::error(case, timer.stop(), format!("{e:#}"));
            }
        };

        let mut ctx = TestContext::new(self.settings, self.cluster.clone(), self.blame.clone(), kuadrant)
            .enforce(self.options.enforce);
        let outcome = scenarios::run(case, &mut ctx).await;
        let duration_ms = timer.stop();

        let cleanup_errors = if self.options.keep {
            info!("Keeping objects labeled app={}", self.blame.label());
            Vec::new()
        } else {
            ctx.teardown().await
        };

        classify(case, duration_ms, outcome).with_cleanup_errors(cleanup_errors)
    }

    pub async fn run_all(&self, cases: &[ScenarioCase]) -> RunSummary {
        info!(
            "Starting run {} with {} scenarios in {}",
            self.blame.label(),
            cases.len(),
            self.cluster.project()
        );

        let started_at = Utc::now();
        let mut results = Vec::with_capacity(cases.len());

        for &case in cases {
            let result = self.run_scenario(case).await;
            info!("  {}", result);
            results.push(result);
        }

        let summary = RunSummary::new(self.blame.label(), self.cluster.project(), started_at, results);
        info!(
            "Run {} completed in {}ms - Pass: {}/{} ({:.1}%)",
            summary.run_label,
            summary.total_duration_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );
        summary
    }
}

/// Map the outcome of a scenario onto a result
///
/// Skips are `Error::Skipped`; unmet expectations and readiness timeouts are
/// failures; anything else is an error.
pub fn classify(case: ScenarioCase, duration_ms: u64, outcome: Result<Vec<String>>) -> ScenarioResult {
    let err = match outcome {
        Ok(details) => return ScenarioResult::pass(case, duration_ms).with_details(details),
        Err(err) => err,
    };

    match err.downcast_ref::<Error>() {
        Some(Error::Skipped(reason)) => {
            info!("{} skipped: {}", case, reason);
            return ScenarioResult::skip(case, reason.clone());
        }
        Some(Error::NotReady { .. }) => {
            return ScenarioResult::fail(case, duration_ms, format!("{err:#}"));
        }
        _ => {}
    }

    if err.downcast_ref::<Failure>().is_some() {
        ScenarioResult::fail(case, duration_ms, format!("{err:#}"))
    } else {
        error!("{} errored: {:#}", case, err);
        ScenarioResult::error(case, duration_ms, format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, Exchange};
    use crate::models::ScenarioStatus;
    use anyhow::Context;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_classify() {
        let case = ScenarioCase::RateLimitEnforcement;

        let pass = classify(case, 10, Ok(vec!["5 allowed".to_string()]));
        assert_eq!(pass.status, ScenarioStatus::Pass);
        assert_eq!(pass.details, vec!["5 allowed"]);

        let skip = classify(case, 10, Err(Error::skipped("no issuer").into()));
        assert_eq!(skip.status, ScenarioStatus::Skip);
        assert_eq!(skip.message.as_deref(), Some("no issuer"));

        let fail = classify(case, 10, Err(Failure("got 200".to_string()).into()));
        assert_eq!(fail.status, ScenarioStatus::Fail);

        let not_ready = Error::not_ready("RateLimitPolicy limit", Duration::from_secs(1), "Enforced=False");
        let timeout = classify(case, 10, Err(anyhow::Error::from(not_ready).context("not ready")));
        assert_eq!(timeout.status, ScenarioStatus::Fail);

        let broken = classify(case, 10, Err(anyhow::anyhow!("connection refused")));
        assert_eq!(broken.status, ScenarioStatus::Error);
    }

    #[test]
    fn test_skip_through_context() {
        let outcome: Result<Vec<String>> = Err(Error::skipped("Keycloak is not configured").into());
        let result = classify(
            ScenarioCase::AnonymousPriority,
            5,
            outcome.context("building topology"),
        );
        assert_eq!(result.status, ScenarioStatus::Skip);
    }

    #[tokio::test]
    async fn test_standalone_skips_kuadrant_scenarios() {
        let settings = Settings::default();
        let (cluster, _server) = mock_cluster();
        let options = RunOptions {
            standalone: true,
            ..Default::default()
        };
        let runner = ScenarioRunner::new(&settings, cluster, options);

        let summary = runner
            .run_all(&[ScenarioCase::UnsupportedGeocode, ScenarioCase::CustomAuthorino])
            .await;
        assert_eq!(summary.skipped, 2);
        assert!(summary.is_success());
        assert!(summary.run_label.starts_with("testrun-"));
    }

    #[tokio::test]
    async fn test_kuadrant_looked_up_in_system_project() {
        let settings = Settings::default();
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![Exchange::get(
            "/apis/kuadrant.io/v1beta1/namespaces/kuadrant-system/kuadrants",
        )
        .ok(json!({
            "apiVersion": "kuadrant.io/v1beta1",
            "kind": "KuadrantList",
            "metadata": {},
            "items": []
        }))]);

        let runner = ScenarioRunner::new(&settings, cluster, RunOptions::default());
        let result = runner.run_scenario(ScenarioCase::RateLimitEnforcement).await;
        assert_eq!(result.status, ScenarioStatus::Skip);
        finish(server).await;
    }
}
