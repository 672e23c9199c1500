//! TLSPolicy: certificates for gateway listeners

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::auth_policy::PolicyStatus;
use super::Policy;
use crate::error::{Error, Result};
use crate::k8s::{Condition, HasConditions, KubeCluster, KubeObject, Referencable, Reference};

/// TLSPolicy custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kuadrant.io",
    version = "v1alpha1",
    kind = "TLSPolicy",
    root = "TlsPolicyResource",
    namespaced
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct TlsPolicySpec {
    pub target_ref: Reference,
    pub issuer_ref: Reference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usages: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct PrivateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// Optional certificate parameters
#[derive(Clone, Debug, Default)]
pub struct TlsPolicyOptions {
    pub labels: BTreeMap<String, String>,
    pub common_name: Option<String>,
    pub duration: Option<String>,
    pub usages: Option<Vec<String>>,
    pub algorithm: Option<String>,
    pub key_size: Option<u32>,
}

impl HasConditions for TlsPolicyResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

pub type TlsPolicy = Policy<TlsPolicyResource>;

impl Policy<TlsPolicyResource> {
    pub fn create_instance<P, I>(
        cluster: &KubeCluster,
        name: &str,
        parent: &P,
        issuer: &I,
        options: TlsPolicyOptions,
    ) -> Self
    where
        P: Referencable + ?Sized,
        I: Referencable + ?Sized,
    {
        let private_key = (options.algorithm.is_some() || options.key_size.is_some()).then(|| {
            PrivateKey {
                algorithm: options.algorithm,
                size: options.key_size,
            }
        });

        let policy = TlsPolicyResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(options.labels),
                ..Default::default()
            },
            spec: TlsPolicySpec {
                target_ref: parent.reference(),
                issuer_ref: issuer.reference(),
                common_name: options.common_name,
                duration: options.duration,
                usages: options.usages,
                private_key,
            },
            status: None,
        };
        Self::from_object(KubeObject::new(cluster, policy))
    }

    /// Spec field by its document name, e.g. `commonName`
    pub fn get(&self, key: &str) -> Option<Value> {
        serde_json::to_value(&self.spec)
            .ok()?
            .get(key)
            .cloned()
    }

    /// Set a spec field by its document name
    pub async fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut spec = serde_json::to_value(&self.spec)?;
        let fields = spec
            .as_object_mut()
            .ok_or_else(|| Error::Config("TLSPolicy spec is not an object".to_string()))?;
        fields.insert(key.to_string(), value);
        let updated: TlsPolicySpec = serde_json::from_value(spec)?;

        self.modify(|policy| {
            policy.spec = updated.clone();
        })
        .await
    }
}
