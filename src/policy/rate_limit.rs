//! RateLimitPolicy

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::auth_policy::PolicyStatus;
use super::Policy;
use crate::error::Result;
use crate::k8s::{Condition, HasConditions, KubeCluster, KubeObject, Referencable, Reference};

/// RateLimitPolicy custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta2",
    kind = "RateLimitPolicy",
    root = "RateLimitPolicyResource",
    namespaced
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    pub target_ref: Reference,

    #[serde(default)]
    pub limits: BTreeMap<String, Limit>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self {
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        };
        write!(f, "{unit}")
    }
}

/// `limit` requests per `duration` `unit`s
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Rate {
    pub limit: u32,
    pub duration: u32,
    pub unit: TimeUnit,
}

impl Rate {
    pub fn new(limit: u32, duration: u32, unit: TimeUnit) -> Self {
        Self { limit, duration, unit }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {} {}", self.limit, self.duration, self.unit)
    }
}

/// Predicate restricting when a limit applies
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct WhenCondition {
    pub selector: String,
    pub operator: String,
    pub value: String,
}

impl WhenCondition {
    pub fn eq(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            operator: "eq".to_string(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Limit {
    pub rates: Vec<Rate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenCondition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<String>,
}

impl HasConditions for RateLimitPolicyResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

pub type RateLimitPolicy = Policy<RateLimitPolicyResource>;

impl Policy<RateLimitPolicyResource> {
    pub fn create_instance<T: Referencable + ?Sized>(
        cluster: &KubeCluster,
        name: &str,
        target: &T,
        labels: BTreeMap<String, String>,
    ) -> Self {
        let policy = RateLimitPolicyResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: RateLimitPolicySpec {
                target_ref: target.reference(),
                limits: BTreeMap::new(),
            },
            status: None,
        };
        Self::from_object(KubeObject::new(cluster, policy))
    }

    pub async fn add_limit(
        &mut self,
        name: &str,
        rates: Vec<Rate>,
        when: Vec<WhenCondition>,
    ) -> Result<()> {
        let limit = Limit {
            rates,
            when,
            counters: Vec::new(),
        };
        self.modify(|policy| {
            policy.spec.limits.insert(name.to_string(), limit.clone());
        })
        .await
    }
}
