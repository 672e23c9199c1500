//! Scenario 1: traffic reaches the backend through gateway and route

use anyhow::Result;
use tracing::info;

use super::{expect_status, Topology};
use crate::fixtures::TestContext;
use crate::gateway::Hostname;

pub async fn basic_routing(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let topology = Topology::build(ctx).await?;
    let client = topology.hostname.client()?;

    let response = client.get("/get").await?;
    expect_status(&response, 200, "GET /get")?;
    info!("{} routed to {}", topology.hostname.hostname(), topology.backend.name());

    Ok(vec![
        format!(
            "Gateway {} serves {}",
            topology.gateway.name(),
            topology.hostname.hostname()
        ),
        format!(
            "GET /get -> {} ({}ms)",
            response.status_code, response.duration_ms
        ),
    ])
}
