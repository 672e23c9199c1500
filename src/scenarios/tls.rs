//! Scenario 6: TLSPolicy gets the gateway a certificate

use anyhow::{Context, Result};

use super::{check, Failure};
use crate::fixtures::TestContext;
use crate::gateway::Gateway;
use crate::k8s::has_condition;
use crate::policy::{TlsPolicy, TlsPolicyOptions};

pub async fn tls_policy_acceptance(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let issuer = ctx
        .settings()
        .control_plane
        .issuer
        .clone()
        .ok_or_else(|| ctx.skip_or_fail("control_plane.issuer is not configured"))?;

    let mut gateway = ctx.gateway(true).await?;
    let options = TlsPolicyOptions {
        labels: ctx.labels(),
        ..Default::default()
    };
    let mut policy = TlsPolicy::create_instance(
        ctx.cluster(),
        &ctx.blame("tls"),
        &gateway.reference(),
        &issuer.reference(),
        options,
    );
    ctx.commit_policy(&mut policy).await?;

    let wait = ctx.wait().clone();
    gateway
        .wait_for_ready(&wait)
        .await
        .context("Gateway was not programmed with the issued certificate")?;

    let affected = format!("kuadrant.io/{}Affected", policy.kind());
    gateway
        .wait_until(
            "affected by TLSPolicy",
            |gw| has_condition(&affected, "True").holds(gw),
            &wait,
        )
        .await?;
    check(gateway.is_affected_by(&policy.handle()), || {
        format!("Gateway {} does not report {affected}", gateway.name())
    })?;

    let hostname = gateway
        .spec
        .listeners
        .first()
        .and_then(|listener| listener.hostname.clone())
        .unwrap_or_default();
    let secret = gateway
        .get_tls_cert(&hostname)
        .await?
        .ok_or_else(|| Failure(format!("Gateway {} has no TLS listener", gateway.name())))?;
    check(secret.certificate.contains("BEGIN CERTIFICATE"), || {
        format!("Secret {} does not hold a PEM certificate", secret.name)
    })?;

    Ok(vec![
        format!("Issuer {}/{}", issuer.kind, issuer.name),
        format!("Certificate stored in {}", secret.name),
    ])
}
