//! AuthPolicy: authentication and authorization in front of a route or gateway

use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Policy;
use crate::error::Result;
use crate::k8s::{Condition, HasConditions, KubeCluster, KubeObject, Referencable, Reference};

/// AuthPolicy custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta2",
    kind = "AuthPolicy",
    root = "AuthPolicyResource",
    namespaced
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpec {
    pub target_ref: Reference,

    #[serde(default)]
    pub rules: AuthRules,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct AuthRules {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication: BTreeMap<String, Identity>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authorization: BTreeMap<String, Authorization>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseRules>,
}

/// One way of establishing who the caller is
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtIdentity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<Anonymous>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKeyIdentity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Lower runs first; identities of equal priority run concurrently
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl Identity {
    pub fn oidc(issuer_url: impl Into<String>) -> Self {
        Self {
            jwt: Some(JwtIdentity {
                issuer_url: issuer_url.into(),
            }),
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            anonymous: Some(Anonymous {}),
            ..Default::default()
        }
    }

    /// API keys stored in Secrets carrying `match_labels`, sent as `Authorization: APIKEY <key>`
    pub fn api_key(match_labels: BTreeMap<String, String>) -> Self {
        Self {
            api_key: Some(ApiKeyIdentity {
                selector: Selector { match_labels },
                all_namespaces: false,
            }),
            credentials: Some(Credentials {
                authorization_header: AuthorizationHeader {
                    prefix: "APIKEY".to_string(),
                },
            }),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JwtIdentity {
    pub issuer_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Anonymous {}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyIdentity {
    pub selector: Selector,
    #[serde(default)]
    pub all_namespaces: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub authorization_header: AuthorizationHeader,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct AuthorizationHeader {
    pub prefix: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matching: Option<PatternMatching>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct PatternMatching {
    pub patterns: Vec<Pattern>,
}

/// `selector <operator> value` evaluated against the authorization JSON
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Pattern {
    pub selector: String,
    /// eq, neq, incl, excl, matches
    pub operator: String,
    pub value: String,
}

impl Pattern {
    pub fn new(selector: impl Into<String>, operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct ResponseRules {
    #[serde(default)]
    pub success: SuccessResponses,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct SuccessResponses {
    #[serde(default)]
    pub headers: BTreeMap<String, SuccessResponse>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct SuccessResponse {
    pub json: JsonResponse,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct JsonResponse {
    pub properties: BTreeMap<String, ValueFrom>,
}

/// Static value or a selector into the authorization JSON
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct ValueFrom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl ValueFrom {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            value: None,
        }
    }
}

/// Status shared by all Kuadrant policies
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct PolicyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl HasConditions for AuthPolicyResource {
    fn conditions(&self) -> Vec<Condition> {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }
}

pub type AuthPolicy = Policy<AuthPolicyResource>;

impl Policy<AuthPolicyResource> {
    pub fn create_instance<T: Referencable + ?Sized>(
        cluster: &KubeCluster,
        name: &str,
        target: &T,
        labels: BTreeMap<String, String>,
    ) -> Self {
        let policy = AuthPolicyResource {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(cluster.project().to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: AuthPolicySpec {
                target_ref: target.reference(),
                rules: AuthRules::default(),
            },
            status: None,
        };
        Self::from_object(KubeObject::new(cluster, policy))
    }

    pub async fn add_identity(&mut self, name: &str, identity: Identity) -> Result<()> {
        self.modify(|policy| {
            policy
                .spec
                .rules
                .authentication
                .insert(name.to_string(), identity.clone());
        })
        .await
    }

    pub async fn add_oidc_identity(&mut self, name: &str, issuer_url: &str) -> Result<()> {
        self.add_identity(name, Identity::oidc(issuer_url)).await
    }

    pub async fn add_anonymous_identity(&mut self, name: &str, priority: Option<i32>) -> Result<()> {
        let identity = match priority {
            Some(priority) => Identity::anonymous().priority(priority),
            None => Identity::anonymous(),
        };
        self.add_identity(name, identity).await
    }

    /// Allow only requests for which every pattern holds
    pub async fn add_pattern_authorization(&mut self, name: &str, patterns: Vec<Pattern>) -> Result<()> {
        let authorization = Authorization {
            pattern_matching: Some(PatternMatching { patterns }),
            priority: None,
        };
        self.modify(|policy| {
            policy
                .spec
                .rules
                .authorization
                .insert(name.to_string(), authorization.clone());
        })
        .await
    }

    /// Add a header to successful responses carrying `properties` as JSON
    pub async fn add_success_header(
        &mut self,
        name: &str,
        properties: BTreeMap<String, ValueFrom>,
    ) -> Result<()> {
        let header = SuccessResponse {
            json: JsonResponse { properties },
        };
        self.modify(|policy| {
            policy
                .spec
                .rules
                .response
                .get_or_insert_with(ResponseRules::default)
                .success
                .headers
                .insert(name.to_string(), header.clone());
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::{finish, mock_cluster, Exchange};
    use crate::k8s::WaitOptions;
    use serde_json::json;
    use std::time::Duration;

    const PATH: &str = "/apis/kuadrant.io/v1beta2/namespaces/default/authpolicies";

    fn target() -> Reference {
        Reference::new("gateway.networking.k8s.io", "HTTPRoute", "route").namespace("default")
    }

    #[tokio::test]
    async fn test_anonymous_priority_document() {
        let (cluster, _server) = mock_cluster();
        let mut policy = AuthPolicy::create_instance(&cluster, "authz", &target(), BTreeMap::new());

        policy
            .add_oidc_identity("default", "https://keycloak/auth/realms/r")
            .await
            .unwrap();
        policy.add_anonymous_identity("anonymous", Some(1)).await.unwrap();
        policy
            .add_success_header(
                "x-auth-data",
                BTreeMap::from([("identity".to_string(), ValueFrom::selector("auth.identity"))]),
            )
            .await
            .unwrap();

        let json = serde_json::to_value(&**policy).unwrap();
        assert_eq!(json["apiVersion"], "kuadrant.io/v1beta2");
        assert_eq!(json["spec"]["targetRef"]["kind"], "HTTPRoute");
        assert_eq!(
            json["spec"]["rules"]["authentication"],
            json!({
                "anonymous": {"anonymous": {}, "priority": 1},
                "default": {"jwt": {"issuerUrl": "https://keycloak/auth/realms/r"}}
            })
        );
        assert_eq!(
            json["spec"]["rules"]["response"]["success"]["headers"]["x-auth-data"]["json"]["properties"]["identity"],
            json!({"selector": "auth.identity"})
        );
        assert!(json["spec"]["rules"].get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_api_key_and_patterns() {
        let (cluster, _server) = mock_cluster();
        let mut policy = AuthPolicy::create_instance(&cluster, "authz", &target(), BTreeMap::new());

        policy
            .add_identity(
                "api-key",
                Identity::api_key(BTreeMap::from([("group".to_string(), "admins".to_string())])),
            )
            .await
            .unwrap();
        policy
            .add_pattern_authorization(
                "only-get",
                vec![Pattern::new("context.request.http.method", "eq", "GET")],
            )
            .await
            .unwrap();

        let json = serde_json::to_value(&**policy).unwrap();
        let api_key = &json["spec"]["rules"]["authentication"]["api-key"];
        assert_eq!(api_key["apiKey"]["selector"]["matchLabels"]["group"], "admins");
        assert_eq!(api_key["credentials"]["authorizationHeader"]["prefix"], "APIKEY");
        assert_eq!(
            json["spec"]["rules"]["authorization"]["only-get"]["patternMatching"]["patterns"][0]["operator"],
            "eq"
        );
    }

    #[tokio::test]
    async fn test_wait_for_enforced() {
        let (cluster, server) = mock_cluster();
        let live = |status: &str| {
            json!({
                "apiVersion": "kuadrant.io/v1beta2", "kind": "AuthPolicy",
                "metadata": {"name": "authz", "namespace": "default"},
                "spec": {"targetRef": {"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "route"}},
                "status": {"conditions": [
                    {"type": "Accepted", "status": "True"},
                    {"type": "Enforced", "status": status}
                ]}
            })
        };
        let server = server.run(vec![
            Exchange::get(format!("{PATH}/authz")).ok(live("False")),
            Exchange::get(format!("{PATH}/authz")).ok(live("True")),
        ]);

        let mut policy = AuthPolicy::create_instance(&cluster, "authz", &target(), BTreeMap::new());
        let options = WaitOptions::new()
            .timeout(Duration::from_secs(5))
            .interval(Duration::from_millis(5));
        policy.wait_for_ready(&options).await.unwrap();
        finish(server).await;
    }

    #[tokio::test]
    async fn test_never_enforced_is_not_ready() {
        let (cluster, server) = mock_cluster();
        let not_enforced = json!({
            "apiVersion": "kuadrant.io/v1beta2", "kind": "AuthPolicy",
            "metadata": {"name": "authz", "namespace": "default"},
            "spec": {"targetRef": {"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "route"}},
            "status": {"conditions": [{"type": "Enforced", "status": "False", "reason": "Unknown"}]}
        });
        let server = server.run(
            (0..50)
                .map(|_| Exchange::get(format!("{PATH}/authz")).ok(not_enforced.clone()))
                .collect(),
        );

        let mut policy = AuthPolicy::create_instance(&cluster, "authz", &target(), BTreeMap::new());
        let options = WaitOptions::new()
            .timeout(Duration::from_millis(30))
            .interval(Duration::from_millis(5));
        let err = policy.wait_for_ready(&options).await.unwrap_err();

        assert!(matches!(err, crate::error::Error::NotReady { .. }));
        assert!(err.to_string().contains("Enforced=False (Unknown)"));
        server.abort();
    }
}
