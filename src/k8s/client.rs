//! Kubernetes client wrapper
//!
//! Binds a kube client to the project (namespace) the suite works in.

use k8s_openapi::api::core::v1::Namespace;
use kube::{
    api::{Api, ApiResource, DynamicObject},
    config::KubeConfigOptions,
    core::GroupVersionKind,
    Client, Config,
};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Kubernetes client bound to a single project
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    project: String,
}

impl KubeCluster {
    /// Connect using the kubeconfig context (current context when `None`)
    pub async fn connect(context: Option<&str>, project: Option<&str>) -> Result<Self> {
        let options = KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        };

        let config = match Config::from_kubeconfig(&options).await {
            Ok(config) => config,
            Err(kubeconfig_err) => {
                debug!("No usable kubeconfig ({kubeconfig_err}), trying in-cluster config");
                Config::infer()
                    .await
                    .map_err(|e| Error::DependencyUnavailable {
                        dependency: "Kubernetes".to_string(),
                        reason: e.to_string(),
                    })?
            }
        };

        let project = project
            .map(str::to_string)
            .unwrap_or_else(|| config.default_namespace.clone());
        let client = Client::try_from(config)?;

        info!("Using Kubernetes project {}", project);
        Ok(Self { client, project })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client, project: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Same cluster, different project
    pub fn change_project(&self, project: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            project: project.into(),
        }
    }

    /// True when the project exists and we can read it
    pub async fn connected(&self) -> bool {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.get(&self.project).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Project {} is not reachable: {}", self.project, e);
                false
            }
        }
    }

    /// Base domain of OpenShift routes
    pub async fn apps_url(&self) -> Result<String> {
        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "Ingress");
        let ar = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);

        let ingress = api.get("cluster").await?;
        ingress
            .data
            .pointer("/spec/domain")
            .and_then(|d| d.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Config("cluster Ingress has no spec.domain".to_string()))
    }

    /// Namespaced API in this project
    pub fn namespaced_api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.project)
    }

    /// Untyped API for a resource kind in a namespace
    pub fn dynamic_api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster")
            .field("project", &self.project)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::mock_cluster;

    #[tokio::test]
    async fn test_change_project() {
        let (cluster, _server) = mock_cluster();
        let other = cluster.change_project("kuadrant-2");

        assert_eq!(cluster.project(), "default");
        assert_eq!(other.project(), "kuadrant-2");
    }
}
