//! Scenario implementations
//!
//! ## Gateway
//! 1. Basic Routing
//!
//! ## Control plane
//! 2. Unsupported Geocode (DNSPolicy)
//! 6. TLS Policy
//!
//! ## Authorino
//! 3. Signing Key Revocation
//! 4. Anonymous Priority
//! 7. Custom Authorino
//!
//! ## Limitador
//! 5. Rate Limit
//!
//! Every scenario builds its topology through [`TestContext`] and returns the
//! observations worth reporting. Expectations that do not hold are reported
//! as [`Failure`]; missing prerequisites as `Error::Skipped`.

mod auth;
mod authorino;
mod dns;
mod rate_limit;
mod routing;
mod tls;

use anyhow::{Context, Result};
use serde_json::Value;
use thiserror::Error;

use crate::backend::Httpbin;
use crate::fixtures::TestContext;
use crate::gateway::{ExposedHostname, HttpRoute, KuadrantGateway};
use crate::http::HttpResponse;
use crate::models::ScenarioCase;

/// An expectation of the scenario did not hold
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Failure(pub String);

/// Run one scenario to completion; cleanup is left to the context
pub async fn run(case: ScenarioCase, ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    if case.needs_kuadrant() {
        ctx.require_kuadrant()?;
    }

    match case {
        ScenarioCase::BasicRouting => routing::basic_routing(ctx).await,
        ScenarioCase::UnsupportedGeocode => dns::unsupported_geocode(ctx).await,
        ScenarioCase::SigningKeyRevocation => auth::signing_key_revocation(ctx).await,
        ScenarioCase::AnonymousPriority => auth::anonymous_priority(ctx).await,
        ScenarioCase::RateLimitEnforcement => rate_limit::rate_limit_enforcement(ctx).await,
        ScenarioCase::TlsPolicyAcceptance => tls::tls_policy_acceptance(ctx).await,
        ScenarioCase::CustomAuthorino => authorino::custom_authorino(ctx).await,
    }
}

/// Httpbin behind a gateway, reachable through an exposed hostname
pub(crate) struct Topology {
    pub backend: Httpbin,
    pub gateway: KuadrantGateway,
    pub hostname: ExposedHostname,
    pub route: HttpRoute,
}

impl Topology {
    pub async fn build(ctx: &mut TestContext<'_>) -> Result<Self> {
        let backend = ctx.backend().await?;
        let mut gateway = ctx.gateway(false).await?;
        let hostname = ctx.hostname(&mut gateway).await?;
        let route = ctx.route(&gateway, &hostname, &backend).await?;
        Ok(Self {
            backend,
            gateway,
            hostname,
            route,
        })
    }
}

pub(crate) fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Failure(message()).into())
    }
}

pub(crate) fn expect_status(response: &HttpResponse, expected: u16, what: &str) -> Result<()> {
    check(response.status_code == expected, || {
        format!(
            "{what}: expected {expected}, got {} ({})",
            response.status_code,
            response.body.chars().take(200).collect::<String>()
        )
    })
}

/// Header added by AuthPolicies to expose the authorization result
pub(crate) const AUTH_DATA_HEADER: &str = "x-auth-data";

/// JSON of the auth data header as echoed back by httpbin
pub(crate) fn extract_auth_data(response: &HttpResponse) -> Result<Value> {
    let echoed: Value = response
        .json()
        .context("Backend response is not the httpbin echo")?;
    let header = echoed
        .get("headers")
        .and_then(|headers| {
            headers.as_object().and_then(|headers| {
                headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(AUTH_DATA_HEADER))
                    .map(|(_, value)| value)
            })
        })
        .and_then(Value::as_str)
        .ok_or_else(|| Failure(format!("Request did not carry the {AUTH_DATA_HEADER} header")))?;
    serde_json::from_str(header).context("Auth data header is not JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status_code: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status_code,
            headers: HashMap::new(),
            body: body.to_string(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_expect_status_reports_failure() {
        expect_status(&response(200, "{}"), 200, "GET /get").unwrap();

        let err = expect_status(&response(401, "denied"), 200, "GET /get").unwrap_err();
        let failure = err.downcast_ref::<Failure>().unwrap();
        assert_eq!(failure.0, "GET /get: expected 200, got 401 (denied)");
    }

    #[test]
    fn test_extract_auth_data() {
        let body = r#"{"headers": {"Host": "h", "X-Auth-Data": "{\"identity\": {\"anonymous\": true}}"}}"#;
        let data = extract_auth_data(&response(200, body)).unwrap();
        assert_eq!(data["identity"], serde_json::json!({"anonymous": true}));
    }

    #[test]
    fn test_missing_auth_data_is_a_failure() {
        let err = extract_auth_data(&response(200, r#"{"headers": {}}"#)).unwrap_err();
        assert!(err.downcast_ref::<Failure>().is_some());
    }
}
