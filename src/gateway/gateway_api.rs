//! Gateway API Gateway managed by Kuadrant

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use tracing::info;

use super::Gateway;
use crate::error::{Error, Result};
use crate::k8s::{
    has_condition, Condition, HasConditions, KubeCluster, KubeObject, ObjectHandle, Reference,
    TlsSecret, WaitOptions,
};

/// Gateway custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    root = "GatewayResource",
    namespaced
)]
#[kube(status = "GatewayStatus")]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub gateway_class_name: String,

    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// Gateway listener specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub port: u16,
    /// Protocol (HTTP, HTTPS, TLS)
    pub protocol: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<ListenerTls>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListenerTls {
    /// Terminate or Passthrough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default)]
    pub certificate_refs: Vec<Reference>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct AllowedRoutes {
    pub namespaces: RouteNamespaces,
}

/// From: All, Same, Selector
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct RouteNamespaces {
    pub from: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayStatus {
    #[serde(default)]
    pub addresses: Vec<GatewayAddress>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayAddress {
    /// IPAddress or Hostname
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,
    pub value: String,
}

impl HasConditions for GatewayResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

/// Istio-backed Gateway with a single `api` listener
pub struct KuadrantGateway {
    object: KubeObject<GatewayResource>,
}

impl KuadrantGateway {
    pub const CLASS: &'static str = "istio";

    /// Gateway serving `hostname` (usually a wildcard)
    ///
    /// With `tls` the listener is HTTPS on 443, terminated with the
    /// certificate stored in `<name>-tls`.
    pub fn create_instance(
        cluster: &KubeCluster,
        name: &str,
        hostname: &str,
        labels: BTreeMap<String, String>,
        tls: bool,
    ) -> Self {
        let listener = if tls {
            Listener {
                name: "api".to_string(),
                port: 443,
                protocol: "HTTPS".to_string(),
                hostname: Some(hostname.to_string()),
                tls: Some(ListenerTls {
                    mode: Some("Terminate".to_string()),
                    certificate_refs: vec![Reference::new("", "Secret", cert_secret_name(name))],
                }),
                allowed_routes: Some(AllowedRoutes {
                    namespaces: RouteNamespaces {
                        from: "All".to_string(),
                    },
                }),
            }
        } else {
            Listener {
                name: "api".to_string(),
                port: 80,
                protocol: "HTTP".to_string(),
                hostname: Some(hostname.to_string()),
                tls: None,
                allowed_routes: Some(AllowedRoutes {
                    namespaces: RouteNamespaces {
                        from: "All".to_string(),
                    },
                }),
            }
        };

        let gateway = GatewayResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: GatewaySpec {
                gateway_class_name: Self::CLASS.to_string(),
                listeners: vec![listener],
            },
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, gateway),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.object.spec.listeners.iter().any(|l| l.tls.is_some())
    }

    /// True when Kuadrant reports `policy` as affecting this gateway
    pub fn is_affected_by(&self, policy: &ObjectHandle) -> bool {
        let affected = format!("kuadrant.io/{}Affected", policy.kind());
        has_condition(&affected, "True").holds(&self.object)
    }
}

fn cert_secret_name(gateway: &str) -> String {
    format!("{gateway}-tls")
}

fn first_address(gateway: &GatewayResource) -> Option<String> {
    gateway
        .status
        .as_ref()
        .and_then(|s| s.addresses.first())
        .map(|a| a.value.clone())
}

impl Gateway for KuadrantGateway {
    fn reference(&self) -> Reference {
        Reference::new("gateway.networking.k8s.io", "Gateway", self.object.name())
            .namespace(self.object.namespace())
    }

    fn service_name(&self) -> String {
        format!("{}-{}", self.object.name(), Self::CLASS)
    }

    async fn external_ip(&mut self, options: &WaitOptions) -> Result<String> {
        if let Some(address) = first_address(&self.object) {
            return Ok(address);
        }

        self.object
            .wait_until("gateway address", |gw| first_address(gw).is_some(), options)
            .await?;

        first_address(&self.object).ok_or_else(|| Error::NotFound {
            kind: "Gateway address".to_string(),
            name: self.object.name(),
        })
    }

    async fn get_tls_cert(&self, _hostname: &str) -> Result<Option<TlsSecret>> {
        if !self.is_tls() {
            return Ok(None);
        }
        let secret = TlsSecret::fetch(self.object.cluster(), &cert_secret_name(&self.object.name())).await?;
        Ok(Some(secret))
    }

    async fn wait_for_ready(&mut self, options: &WaitOptions) -> Result<()> {
        self.object
            .wait_for_condition(&has_condition("Programmed", "True"), options)
            .await?;
        info!("Gateway {} is programmed", self.object.name());
        Ok(())
    }
}

impl Deref for KuadrantGateway {
    type Target = KubeObject<GatewayResource>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for KuadrantGateway {
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

    const PATH: &str = "/apis/gateway.networking.k8s.io/v1/namespaces/default/gateways";

    fn live(conditions: serde_json::Value, addresses: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "gw", "namespace": "default"},
            "spec": {"gatewayClassName": "istio", "listeners": []},
            "status": {"conditions": conditions, "addresses": addresses}
        })
    }

    fn fast() -> WaitOptions {
        WaitOptions::new()
            .timeout(Duration::from_secs(5))
            .interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_gateway_document() {
        let (cluster, _server) = mock_cluster();
        let gw = KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), false);
        let json = serde_json::to_value(&**gw).unwrap();

        assert_eq!(json["spec"]["gatewayClassName"], "istio");
        assert_eq!(json["spec"]["listeners"][0]["name"], "api");
        assert_eq!(json["spec"]["listeners"][0]["port"], 80);
        assert_eq!(json["spec"]["listeners"][0]["hostname"], "*.example.com");
        assert_eq!(gw.service_name(), "gw-istio");
        assert!(!gw.is_tls());

        let reference = serde_json::to_value(gw.reference()).unwrap();
        assert_eq!(
            reference,
            json!({"group": "gateway.networking.k8s.io", "kind": "Gateway", "name": "gw", "namespace": "default"})
        );
    }

    #[tokio::test]
    async fn test_tls_listener() {
        let (cluster, _server) = mock_cluster();
        let gw = KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), true);
        let json = serde_json::to_value(&**gw).unwrap();

        let listener = &json["spec"]["listeners"][0];
        assert_eq!(listener["protocol"], "HTTPS");
        assert_eq!(listener["tls"]["certificateRefs"][0]["name"], "gw-tls");
        assert!(gw.is_tls());
    }

    #[tokio::test]
    async fn test_wait_for_programmed() {
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![
            Exchange::get(format!("{PATH}/gw")).ok(live(
                json!([{"type": "Programmed", "status": "False", "reason": "Pending"}]),
                json!([]),
            )),
            Exchange::get(format!("{PATH}/gw")).ok(live(
                json!([{"type": "Programmed", "status": "True"}]),
                json!([{"type": "IPAddress", "value": "192.0.2.10"}]),
            )),
        ]);

        let mut gw = KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), false);
        gw.wait_for_ready(&fast()).await.unwrap();
        assert_eq!(gw.external_ip(&fast()).await.unwrap(), "192.0.2.10");
        finish(server).await;
    }

    #[tokio::test]
    async fn test_is_affected_by() {
        let (cluster, server) = mock_cluster();
        let server = server.run(vec![Exchange::get(format!("{PATH}/gw")).ok(live(
            json!([{"type": "kuadrant.io/AuthPolicyAffected", "status": "True"}]),
            json!([]),
        ))]);

        let mut gw = KuadrantGateway::create_instance(&cluster, "gw", "*.example.com", BTreeMap::new(), false);
        gw.refresh().await.unwrap();

        let auth = ObjectHandle::of::<crate::policy::AuthPolicyResource>(&cluster, "authz");
        let limit = ObjectHandle::of::<crate::policy::RateLimitPolicyResource>(&cluster, "limit");
        assert!(gw.is_affected_by(&auth));
        assert!(!gw.is_affected_by(&limit));
        finish(server).await;
    }
}
