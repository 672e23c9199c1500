//! Scenario 2: a geo code the DNS provider does not know

use anyhow::{Context, Result};

use super::Failure;
use crate::error::{self, Error};
use crate::fixtures::TestContext;
use crate::gateway::Gateway;
use crate::k8s::has_condition;
use crate::policy::{has_record_condition, DnsPolicy, LoadBalancing};

pub async fn unsupported_geocode(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let provider_secret = ctx
        .settings()
        .control_plane
        .dns_provider_secret
        .clone()
        .ok_or_else(|| ctx.skip_or_fail("control_plane.dns_provider_secret is not configured"))?;

    let gateway = ctx.gateway(false).await?;
    let load_balancing = LoadBalancing {
        weight: 10,
        geo: "EU".to_string(),
        default_geo: true,
    };
    let mut policy = DnsPolicy::create_instance(
        ctx.cluster(),
        &ctx.blame("dns"),
        &gateway.reference(),
        &provider_secret,
        Some(load_balancing),
        ctx.labels(),
    );
    ctx.commit_policy(&mut policy).await?;

    policy.refresh().await?;
    if let Some(load_balancing) = policy.object_mut().spec.load_balancing.as_mut() {
        load_balancing.geo = "XX".to_string();
    }
    policy.apply().await.context("Applying geo code XX was rejected")?;

    let wait = ctx.wait().clone();
    policy
        .wait_for_condition(&has_condition("Enforced", "False"), &wait)
        .await?;

    let reached = policy
        .wait_until(
            "record Ready=False (ProviderError)",
            has_record_condition("Ready", "False", Some("ProviderError")),
            &wait,
        )
        .await;
    expected_record_status(reached, || policy.record_conditions())?;

    Ok(vec![format!("Records: {}", policy.record_conditions())])
}

/// Only running out of time means the records never reached the expected status
fn expected_record_status(reached: error::Result<()>, observed: impl FnOnce() -> String) -> Result<()> {
    match reached {
        Ok(()) => Ok(()),
        Err(Error::NotReady { .. }) => Err(Failure(format!(
            "DNSPolicy did not reach the expected record status, instead it was: {}",
            observed()
        ))
        .into()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_is_a_failure() {
        let timeout = Error::not_ready("DNSPolicy dns", Duration::from_secs(1), "Ready=True");
        let err = expected_record_status(Err(timeout), || "Ready=True".to_string()).unwrap_err();
        let failure = err.downcast_ref::<Failure>().unwrap();
        assert!(failure.0.ends_with("instead it was: Ready=True"));
    }

    #[test]
    fn test_other_errors_propagate() {
        let rejected = Error::Config("admission webhook denied the request".to_string());
        let err = expected_record_status(Err(rejected), || unreachable!()).unwrap_err();
        assert!(err.downcast_ref::<Failure>().is_none());
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));

        expected_record_status(Ok(()), || unreachable!()).unwrap();
    }
}
