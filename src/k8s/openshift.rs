//! OpenShift Route objects

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

use super::{KubeCluster, KubeObject};

/// Route custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(group = "route.openshift.io", version = "v1", kind = "Route", namespaced)]
#[kube(status = "RouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub to: RouteTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct RouteTarget {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Port name (or number as a string) on the target service
    pub target_port: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    pub termination: Termination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

/// Where TLS is terminated
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    #[default]
    Edge,
    Passthrough,
    Reencrypt,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct RouteIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Route exposing a service under the cluster apps domain
pub struct OpenShiftRoute {
    object: KubeObject<Route>,
}

impl OpenShiftRoute {
    /// Route to `service` on `target_port`; `tls` adds a TLS block with `termination`
    pub fn create_instance(
        cluster: &KubeCluster,
        name: &str,
        service: &str,
        target_port: &str,
        tls: bool,
        termination: Termination,
    ) -> Self {
        let route = Route {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                ..Default::default()
            },
            spec: RouteSpec {
                host: None,
                to: RouteTarget {
                    kind: "Service".to_string(),
                    name: service.to_string(),
                },
                port: Some(RoutePort {
                    target_port: target_port.to_string(),
                }),
                tls: tls.then(|| RouteTls {
                    termination,
                    insecure_edge_termination_policy: None,
                }),
            },
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, route),
        }
    }

    /// Host admitted by the router, or the requested one before admission
    pub fn route_host(&self) -> Option<String> {
        self.object
            .status
            .as_ref()
            .and_then(|s| s.ingress.first())
            .and_then(|i| i.host.clone())
            .or_else(|| self.object.spec.host.clone())
    }

    /// True when the route serves TLS itself
    pub fn is_tls(&self) -> bool {
        self.object.spec.tls.is_some()
    }
}

impl Deref for OpenShiftRoute {
    type Target = KubeObject<Route>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for OpenShiftRoute {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}
