//! HTTPRoute resource management
//!
//! Builders for attaching hostnames and backends to a gateway. Every edit
//! goes through `modify`, so it is local before `commit` and a
//! read-modify-write afterwards.

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use super::{Gateway, MatchType, PathMatch, RouteMatch};
use crate::error::Result;
use crate::http::KuadrantClient;
use crate::k8s::{
    check_condition, Condition, KubeCluster, KubeObject, ObjectHandle, Referencable, Reference,
};

/// Controller name Kuadrant writes its route status under
pub const POLICY_CONTROLLER: &str = "kuadrant.io/policy-controller";

/// HTTPRoute custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "HTTPRoute",
    root = "HttpRouteResource",
    namespaced
)]
#[kube(status = "HttpRouteStatus")]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    #[serde(default)]
    pub parent_refs: Vec<Reference>,

    #[serde(default)]
    pub hostnames: Vec<String>,

    #[serde(default)]
    pub rules: Vec<HttpRouteRule>,
}

/// HTTPRoute routing rule
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    #[serde(default)]
    pub matches: Vec<RouteMatch>,

    #[serde(default)]
    pub backend_refs: Vec<Reference>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct HttpRouteStatus {
    #[serde(default)]
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteParentStatus {
    #[serde(default)]
    pub parent_ref: Reference,

    pub controller_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// HTTPRoute attached to one gateway
pub struct HttpRoute {
    object: KubeObject<HttpRouteResource>,
}

impl HttpRoute {
    pub fn create_instance<G: Gateway>(
        cluster: &KubeCluster,
        name: &str,
        gateway: &G,
        labels: BTreeMap<String, String>,
    ) -> Self {
        let route = HttpRouteResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: HttpRouteSpec {
                parent_refs: vec![gateway.reference()],
                hostnames: Vec::new(),
                rules: Vec::new(),
            },
            status: None,
        };

        Self {
            object: KubeObject::new(cluster, route),
        }
    }

    pub fn hostnames(&self) -> &[String] {
        &self.object.spec.hostnames
    }

    pub fn rules(&self) -> &[HttpRouteRule] {
        &self.object.spec.rules
    }

    /// Adds hostname unless already present
    pub async fn add_hostname(&mut self, hostname: &str) -> Result<()> {
        self.object
            .modify(|route| {
                if !route.spec.hostnames.iter().any(|h| h == hostname) {
                    route.spec.hostnames.push(hostname.to_string());
                }
            })
            .await
    }

    pub async fn remove_hostname(&mut self, hostname: &str) -> Result<()> {
        self.object
            .modify(|route| route.spec.hostnames.retain(|h| h != hostname))
            .await
    }

    pub async fn remove_all_hostnames(&mut self) -> Result<()> {
        self.object
            .modify(|route| route.spec.hostnames.clear())
            .await
    }

    /// Adds rule sending matching requests to `backend`; no matches means every path
    pub async fn add_rule<B: Referencable + ?Sized>(
        &mut self,
        backend: &B,
        matches: Vec<RouteMatch>,
    ) -> Result<()> {
        let matches = if matches.is_empty() {
            vec![RouteMatch::path(PathMatch {
                match_type: MatchType::PathPrefix,
                value: "/".to_string(),
            })]
        } else {
            matches
        };
        let rule = HttpRouteRule {
            matches,
            backend_refs: vec![backend.reference()],
        };

        self.object
            .modify(|route| route.spec.rules.push(rule.clone()))
            .await
    }

    pub async fn remove_all_rules(&mut self) -> Result<()> {
        self.object.modify(|route| route.spec.rules.clear()).await
    }

    /// Adds rule sending everything under `prefix` to `backend`
    pub async fn add_backend<B: Referencable + ?Sized>(
        &mut self,
        backend: &B,
        prefix: &str,
    ) -> Result<()> {
        self.add_rule(backend, vec![RouteMatch::path(PathMatch::prefix(prefix))])
            .await
    }

    pub async fn remove_all_backend(&mut self) -> Result<()> {
        self.remove_all_rules().await
    }

    /// True when the Kuadrant policy controller reports `policy` as affecting this route
    pub fn is_affected_by(&self, policy: &ObjectHandle) -> bool {
        let kind = policy.kind();
        let affected = format!("kuadrant.io/{kind}Affected");
        let message = format!(
            "Object affected by {kind} {}/{}",
            policy.namespace(),
            policy.name()
        );

        self.object
            .status
            .iter()
            .flat_map(|s| s.parents.iter())
            .filter(|parent| parent.controller_name == POLICY_CONTROLLER)
            .flat_map(|parent| parent.conditions.iter())
            .any(|c| check_condition(c, &affected, "True", Some("Accepted"), Some(&message)))
    }

    /// Plain HTTP client for the first hostname
    pub fn client(&self) -> anyhow::Result<KuadrantClient> {
        let hostname = self
            .hostnames()
            .first()
            .ok_or_else(|| anyhow::anyhow!("HTTPRoute {} has no hostname", self.object.name()))?;
        KuadrantClient::builder(format!("http://{hostname}")).build()
    }
}

impl Referencable for HttpRoute {
    fn reference(&self) -> Reference {
        Reference::new("gateway.networking.k8s.io", "HTTPRoute", self.object.name())
            .namespace(self.object.namespace())
    }
}

impl Deref for HttpRoute {
    type Target = KubeObject<HttpRouteResource>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl DerefMut for HttpRoute {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.object
    }
}
