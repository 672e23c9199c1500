//! Authorino instance deployed through the Authorino operator

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use tracing::info;

use crate::error::Result;
use crate::k8s::{has_condition, Condition, HasConditions, KubeCluster, KubeObject, WaitOptions};

/// Authorino custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "operator.authorino.kuadrant.io",
    version = "v1beta1",
    kind = "Authorino",
    root = "AuthorinoResource",
    namespaced
)]
#[kube(status = "AuthorinoStatus")]
#[serde(rename_all = "camelCase")]
pub struct AuthorinoSpec {
    #[serde(default)]
    pub cluster_wide: bool,

    pub listener: ServerSettings,

    pub oidc_server: ServerSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Comma separated label selectors of AuthConfigs this instance watches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_label_selectors: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_label_selectors: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct ServerSettings {
    pub tls: TlsSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_secret_ref: Option<SecretRef>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct SecretRef {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct AuthorinoStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HasConditions for AuthorinoResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

/// Optional Authorino parameters
#[derive(Clone, Debug, Default)]
pub struct AuthorinoOptions {
    pub image: Option<String>,
    pub cluster_wide: bool,
    pub label_selectors: Vec<String>,
    /// Secret with the certificate of a TLS listener
    pub listener_certificate_secret: Option<String>,
    pub log_level: Option<String>,
}

pub struct AuthorinoCr {
    object: KubeObject<AuthorinoResource>,
}

impl AuthorinoCr {
    pub fn create_instance(cluster: &KubeCluster, name: &str, options: AuthorinoOptions) -> Self {
        let listener = ServerSettings {
            tls: TlsSettings {
                enabled: options.listener_certificate_secret.is_some(),
                cert_secret_ref: options
                    .listener_certificate_secret
                    .map(|name| SecretRef { name }),
            },
        };
        let selectors = (!options.label_selectors.is_empty())
            .then(|| options.label_selectors.join(","));

        let authorino = AuthorinoResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                ..Default::default()
            },
            spec: AuthorinoSpec {
                cluster_wide: options.cluster_wide,
                listener,
                oidc_server: ServerSettings::default(),
                image: options.image,
                replicas: None,
                log_level: options.log_level,
                auth_config_label_selectors: selectors.clone(),
                secret_label_selectors: selectors,
            },
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, authorino),
        }
    }

    /// Authorization service address gateways talk to
    pub fn authorization_url(&self) -> String {
        format!(
            "{}-authorino-authorization.{}.svc.cluster.local",
            self.object.name(),
            self.object.namespace()
        )
    }

    pub async fn wait_for_ready(&mut self, options: &WaitOptions) -> Result<()> {
        self.object
            .wait_for_condition(&has_condition("Ready", "True"), options)
            .await?;
        info!("Authorino {} is ready", self.object.name());
        Ok(())
    }
}

impl Deref for AuthorinoCr {
    type Target = KubeObject<AuthorinoResource>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for AuthorinoCr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, Exchange};
    use serde_json::json;
    use std::time::Duration;

    const PATH: &str = "/apis/operator.authorino.kuadrant.io/v1beta1/namespaces/default/authorinos";

    #[tokio::test]
    async fn test_authorino_document() {
        let (cluster, _server) = mock_cluster();
        let authorino = AuthorinoCr::create_instance(
            &cluster,
            "authorino-x",
            AuthorinoOptions {
                image: Some("quay.io/kuadrant/authorino:latest".to_string()),
                label_selectors: vec!["testRun=abc".to_string()],
                ..Default::default()
            },
        );

        let json = serde_json::to_value(&**authorino).unwrap();
        assert_eq!(json["spec"]["clusterWide"], false);
        assert_eq!(json["spec"]["listener"], json!({"tls": {"enabled": false}}));
        assert_eq!(json["spec"]["oidcServer"], json!({"tls": {"enabled": false}}));
        assert_eq!(json["spec"]["authConfigLabelSelectors"], "testRun=abc");
        assert_eq!(json["spec"]["image"], "quay.io/kuadrant/authorino:latest");
        assert_eq!(
            authorino.authorization_url(),
            "authorino-x-authorino-authorization.default.svc.cluster.local"
        );
    }

    #[tokio::test]
    async fn test_wait_for_ready() {
        let (cluster, server) = mock_cluster();
        let live = |ready: &str| {
            json!({
                "apiVersion": "operator.authorino.kuadrant.io/v1beta1", "kind": "Authorino",
                "metadata": {"name": "authorino-x", "namespace": "default"},
                "spec": {"listener": {"tls": {"enabled": false}}, "oidcServer": {"tls": {"enabled": false}}},
                "status": {"conditions": [{"type": "Ready", "status": ready}]}
            })
        };
        let server = server.run(vec![
            Exchange::post(PATH).ok(live("False")),
            Exchange::get(format!("{PATH}/authorino-x")).ok(live("False")),
            Exchange::get(format!("{PATH}/authorino-x")).ok(live("True")),
        ]);

        let mut authorino =
            AuthorinoCr::create_instance(&cluster, "authorino-x", AuthorinoOptions::default());
        authorino.commit().await.unwrap();
        let options = WaitOptions::new()
            .timeout(Duration::from_secs(5))
            .interval(Duration::from_millis(5));
        authorino.wait_for_ready(&options).await.unwrap();
        finish(server).await;
    }
}
