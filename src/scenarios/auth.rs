//! Authorino scenarios backed by a Keycloak realm

use anyhow::Result;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use super::{check, expect_status, extract_auth_data, Topology, AUTH_DATA_HEADER};
use crate::fixtures::TestContext;
use crate::gateway::Hostname;
use crate::oidc::OidcProvider;
use crate::policy::{AuthPolicy, ValueFrom};

/// Scenario 3: tokens signed by a key the gateway never saw are rejected
pub async fn signing_key_revocation(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let topology = Topology::build(ctx).await?;
    let issuer = ctx.keycloak().await?.issuer_url();

    let mut policy =
        AuthPolicy::create_instance(ctx.cluster(), &ctx.blame("authz"), &topology.route, ctx.labels());
    policy.add_oidc_identity("keycloak", &issuer).await?;
    ctx.commit_policy(&mut policy).await?;

    let client = topology.hostname.client()?;
    let keycloak = ctx.keycloak().await?;
    let mut details = Vec::new();

    let token = keycloak.get_token(None, None).await?;
    let response = client.get_with_token("/get", &token.access_token).await?;
    expect_status(&response, 200, "Token signed before revocation")?;
    details.push(format!("Before revocation: {}", response.status_code));

    let revoked = keycloak.delete_signing_rs256_jwks_key().await?;
    let keys = keycloak.list_keys().await?;
    check(
        !keys
            .iter()
            .any(|key| key.provider_id == revoked && key.is_active_rs256_signing()),
        || format!("Key provider {revoked} is still listed as the active RS256 signing key"),
    )?;
    details.push(format!("Revoked key provider {revoked}"));

    // the realm cannot issue tokens without a signing key
    keycloak.create_signing_rs256_jwks_key().await?;
    let token = keycloak.get_token(None, None).await?;
    let response = client.get_with_token("/get", &token.access_token).await?;
    expect_status(&response, 401, "Token signed after revocation")?;
    details.push(format!("After revocation: {}", response.status_code));

    info!("Tokens signed after revocation are rejected at {}", topology.hostname.hostname());
    Ok(details)
}

/// Scenario 4: the OIDC identity wins over an anonymous one of lower priority
pub async fn anonymous_priority(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let topology = Topology::build(ctx).await?;
    let issuer = ctx.keycloak().await?.issuer_url();

    let mut policy =
        AuthPolicy::create_instance(ctx.cluster(), &ctx.blame("authz"), &topology.route, ctx.labels());
    policy.add_oidc_identity("keycloak", &issuer).await?;
    policy.add_anonymous_identity("anonymous", Some(1)).await?;
    policy
        .add_success_header(
            AUTH_DATA_HEADER,
            BTreeMap::from([("identity".to_string(), ValueFrom::selector("auth.identity"))]),
        )
        .await?;
    ctx.commit_policy(&mut policy).await?;

    let client = topology.hostname.client()?;
    let keycloak = ctx.keycloak().await?;
    let expected_issuer = keycloak.well_known().await?["issuer"].clone();

    let token = keycloak.get_token(None, None).await?;
    let response = client.get_with_token("/get", &token.access_token).await?;
    expect_status(&response, 200, "Request with a token")?;
    let identity = extract_auth_data(&response)?["identity"].clone();
    check(identity["iss"] == expected_issuer, || {
        format!("Expected the OIDC identity issued by {expected_issuer}, got {identity}")
    })?;

    let response = client.get("/get").await?;
    expect_status(&response, 200, "Request without a token")?;
    let anonymous = extract_auth_data(&response)?["identity"].clone();
    check(anonymous == json!({"anonymous": true}), || {
        format!("Expected the anonymous identity, got {anonymous}")
    })?;

    Ok(vec![
        format!("With token: iss={}", identity["iss"]),
        format!("Without token: {anonymous}"),
    ])
}
