//! Scenario 7: Authorino deployed through the operator

use anyhow::Result;

use super::check;
use crate::fixtures::TestContext;
use crate::policy::AuthorinoOptions;

pub async fn custom_authorino(ctx: &mut TestContext<'_>) -> Result<Vec<String>> {
    let selector = format!("testRun={}", ctx.label());
    let authorino = ctx
        .authorino(AuthorinoOptions {
            log_level: Some("debug".to_string()),
            ..Default::default()
        })
        .await?;

    let selectors = authorino.spec.auth_config_label_selectors.clone().unwrap_or_default();
    check(selectors.split(',').any(|s| s == selector), || {
        format!("Authorino {} watches {selectors:?} instead of {selector}", authorino.name())
    })?;

    Ok(vec![
        format!("Authorino {} is ready", authorino.name()),
        format!("Authorization service at {}", authorino.authorization_url()),
    ])
}
