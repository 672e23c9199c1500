//! Gateways, routes and exposed hostnames
//!
//! A `Gateway` receives traffic, an `HttpRoute` attaches a hostname and
//! rules to it, and an `Exposer` makes the hostname reachable from the
//! machine running the suite.

mod exposers;
mod gateway_api;
mod route;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::http::KuadrantClient;
use crate::k8s::{Reference, TlsSecret, WaitOptions};

pub use exposers::{ExposedHostname, Exposer, ExposerKind, StaticLocalHostname};
pub use gateway_api::{GatewayResource, GatewaySpec, KuadrantGateway, Listener};
pub use route::{HttpRoute, HttpRouteResource, HttpRouteRule, HttpRouteSpec};

/// Something traffic can be sent to
#[allow(async_fn_in_trait)]
pub trait Gateway {
    fn reference(&self) -> Reference;

    /// Service fronting the gateway pods
    fn service_name(&self) -> String;

    /// Address the gateway is reachable at from outside the cluster
    async fn external_ip(&mut self, options: &WaitOptions) -> Result<String>;

    /// Material to verify TLS served for `hostname`, when the gateway serves TLS
    async fn get_tls_cert(&self, hostname: &str) -> Result<Option<TlsSecret>>;

    async fn wait_for_ready(&mut self, options: &WaitOptions) -> Result<()>;
}

/// A hostname reachable from the suite
pub trait Hostname {
    fn hostname(&self) -> String;

    /// Client sending requests to this hostname
    fn client(&self) -> anyhow::Result<KuadrantClient>;
}

/// How a path or header value is compared
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum MatchType {
    Exact,
    #[default]
    PathPrefix,
    RegularExpression,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PathMatch {
    #[serde(rename = "type")]
    pub match_type: MatchType,
    pub value: String,
}

impl PathMatch {
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::PathPrefix,
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HeadersMatch {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub match_type: MatchType,
}

/// Conditions a request must meet for a rule to apply
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeadersMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl RouteMatch {
    pub fn path(path: PathMatch) -> Self {
        Self {
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeadersMatch {
            name: name.into(),
            value: value.into(),
            match_type: MatchType::Exact,
        });
        self
    }
}
