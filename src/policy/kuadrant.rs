//! The Kuadrant instance installed in the system project

use kube::api::{Api, ListParams};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use tracing::{debug, info};

use crate::error::{kube_code, Result};
use crate::k8s::{has_condition, Condition, HasConditions, KubeCluster, KubeObject};

/// Kuadrant custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta1",
    kind = "Kuadrant",
    root = "KuadrantResource",
    namespaced
)]
#[kube(status = "KuadrantStatus")]
pub struct KuadrantSpec {}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct KuadrantStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HasConditions for KuadrantResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

/// Installed Kuadrant instance
pub struct KuadrantCr {
    object: KubeObject<KuadrantResource>,
}

impl KuadrantCr {
    /// First Kuadrant in the cluster's project, `None` when Kuadrant is not installed
    pub async fn find(cluster: &KubeCluster) -> Result<Option<Self>> {
        let api: Api<KuadrantResource> = cluster.namespaced_api();
        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            // CRD not installed
            Err(e) if kube_code(&e) == Some(404) => {
                debug!("Kuadrant CRD is not installed: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(list.items.into_iter().next().map(|kuadrant| {
            info!(
                "Found Kuadrant {} in {}",
                kuadrant.metadata.name.as_deref().unwrap_or_default(),
                cluster.project()
            );
            Self {
                object: KubeObject::new(cluster, kuadrant),
            }
        }))
    }

    pub fn is_ready(&self) -> bool {
        has_condition("Ready", "True").holds(&self.object)
    }
}

impl Deref for KuadrantCr {
    type Target = KubeObject<KuadrantResource>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, status_failure, Exchange};
    use serde_json::json;

    const PATH: &str = "/apis/kuadrant.io/v1beta1/namespaces/kuadrant-system/kuadrants";

    #[tokio::test]
    async fn test_find_installed() {
        let (cluster, server) = mock_cluster();
        let system = cluster.change_project("kuadrant-system");
        let server = server.run(vec![Exchange::get(PATH).ok(json!({
            "apiVersion": "kuadrant.io/v1beta1",
            "kind": "KuadrantList",
            "metadata": {},
            "items": [{
                "apiVersion": "kuadrant.io/v1beta1",
                "kind": "Kuadrant",
                "metadata": {"name": "kuadrant", "namespace": "kuadrant-system"},
                "spec": {},
                "status": {"conditions": [{"type": "Ready", "status": "True"}]}
            }]
        }))]);

        let kuadrant = KuadrantCr::find(&system).await.unwrap().unwrap();
        assert_eq!(kuadrant.name(), "kuadrant");
        assert!(kuadrant.is_ready());
        finish(server).await;
    }

    #[tokio::test]
    async fn test_not_installed() {
        let (cluster, server) = mock_cluster();
        let system = cluster.change_project("kuadrant-system");
        let server = server.run(vec![
            Exchange::get(PATH).respond(404, status_failure(404, "NotFound"))
        ]);

        assert!(KuadrantCr::find(&system).await.unwrap().is_none());
        finish(server).await;
    }
}
