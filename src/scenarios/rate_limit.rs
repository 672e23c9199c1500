//! Scenario 5: Limitador answers 429 once a limit is used up

use anyhow::Result;

use super::{check, expect_status, Topology};
use crate::fixtures::TestContext;
use crate::gateway::Hostname;
use crate::policy::{Rate, RateLimitPolicy, TimeUnit};

const LIMIT: u32 = 5;

pub async fn rate_limit_enforcement(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let topology = Topology::build(ctx).await?;

    let mut policy =
        RateLimitPolicy::create_instance(ctx.cluster(), &ctx.blame("limit"), &topology.route, ctx.labels());
    policy
        .add_limit("basic", vec![Rate::new(LIMIT, 60, TimeUnit::Second)], Vec::new())
        .await?;
    ctx.commit_policy(&mut policy).await?;

    let client = topology.hostname.client()?;
    let responses = client.get_many("/get", LIMIT as usize).await?;
    let statuses: Vec<u16> = responses.iter().map(|r| r.status_code).collect();
    check(statuses.iter().all(|status| *status == 200), || {
        format!("Requests within the limit were not all allowed: {statuses:?}")
    })?;

    let response = client.get("/get").await?;
    expect_status(&response, 429, "Request over the limit")?;

    Ok(vec![
        format!("{LIMIT} requests within 60s: {statuses:?}"),
        format!("Request {}: {}", LIMIT + 1, response.status_code),
    ])
}
