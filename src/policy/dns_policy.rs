//! DNSPolicy: DNS records for gateway listeners

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Policy;
use crate::k8s::{
    check_condition, Condition, HasConditions, KubeCluster, KubeObject, Referencable, Reference,
};

/// DNSPolicy custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kuadrant.io",
    version = "v1alpha1",
    kind = "DNSPolicy",
    root = "DnsPolicyResource",
    namespaced
)]
#[kube(status = "DnsPolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct DnsPolicySpec {
    pub target_ref: Reference,

    #[serde(default)]
    pub provider_refs: Vec<ProviderRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,
}

/// Secret holding DNS provider credentials
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct ProviderRef {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancing {
    pub weight: i32,
    /// Geo code of the records, e.g. `EU`
    pub geo: String,
    pub default_geo: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsPolicyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Conditions of each DNS record, keyed by root host
    #[serde(default)]
    pub record_conditions: BTreeMap<String, Vec<Condition>>,
}

impl HasConditions for DnsPolicyResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

/// Predicate: any DNS record of the policy reports the condition
pub fn has_record_condition<'a>(
    condition_type: &'a str,
    status: &'a str,
    reason: Option<&'a str>,
) -> impl Fn(&DnsPolicyResource) -> bool + 'a {
    move |policy| {
        policy
            .status
            .iter()
            .flat_map(|s| s.record_conditions.values())
            .flatten()
            .any(|c| check_condition(c, condition_type, status, reason, None))
    }
}

pub type DnsPolicy = Policy<DnsPolicyResource>;

impl Policy<DnsPolicyResource> {
    pub fn create_instance<T: Referencable + ?Sized>(
        cluster: &KubeCluster,
        name: &str,
        parent: &T,
        provider_secret: &str,
        load_balancing: Option<LoadBalancing>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        let policy = DnsPolicyResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: DnsPolicySpec {
                target_ref: parent.reference(),
                provider_refs: vec![ProviderRef {
                    name: provider_secret.to_string(),
                }],
                load_balancing,
            },
            status: None,
        };
        Self::from_object(KubeObject::new(cluster, policy))
    }

    /// Record conditions rendered for error messages
    pub fn record_conditions(&self) -> String {
        match &self.status {
            Some(status) if !status.record_conditions.is_empty() => status
                .record_conditions
                .iter()
                .map(|(host, conditions)| {
                    let rendered: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                    format!("{host}: [{}]", rendered.join(", "))
                })
                .collect::<Vec<_>>()
                .join("; "),
            _ => "no record conditions reported".to_string(),
        }
    }
}
