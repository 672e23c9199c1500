//! Configuration module
//!
//! `Settings` is loaded once per run (file, then environment overrides) and
//! passed by reference to everything that needs it. Every section has
//! defaults, so a missing key reads as a neutral value.

mod env;
mod file;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::gateway::ExposerKind;
use crate::k8s::{Reference, WaitOptions};

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard, ENV_PREFIX};
pub use file::{expand_path, CONFIG_LOCATIONS};

/// Test run configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub cluster: ClusterSettings,
    pub service_protection: ServiceProtection,
    pub authorino: AuthorinoSettings,
    pub httpbin: HttpbinSettings,
    pub mockserver: MockserverSettings,
    pub keycloak: KeycloakSettings,
    pub control_plane: ControlPlaneSettings,
    pub default_exposer: ExposerKind,

    /// Read errors tolerated while waiting for a condition
    pub tolerate_failures: u32,
    pub wait_timeout_secs: u64,

    /// Prefix of every generated object name; random when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_prefix: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster: ClusterSettings::default(),
            service_protection: ServiceProtection::default(),
            authorino: AuthorinoSettings::default(),
            httpbin: HttpbinSettings::default(),
            mockserver: MockserverSettings::default(),
            keycloak: KeycloakSettings::default(),
            control_plane: ControlPlaneSettings::default(),
            default_exposer: ExposerKind::OpenShift,
            tolerate_failures: 5,
            wait_timeout_secs: 90,
            run_prefix: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusterSettings {
    /// Kubeconfig context, the current one when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Projects the suite works in
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceProtection {
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project2: Option<String>,
    /// Where Kuadrant itself is installed
    pub system_project: String,
}

impl Default for ServiceProtection {
    fn default() -> Self {
        Self {
            project: "kuadrant".to_string(),
            project2: None,
            system_project: "kuadrant-system".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthorinoSettings {
    /// Whether scenarios may deploy their own Authorino
    pub deploy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Default for AuthorinoSettings {
    fn default() -> Self {
        Self {
            deploy: true,
            image: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpbinSettings {
    pub image: String,
}

impl Default for HttpbinSettings {
    fn default() -> Self {
        Self {
            image: "quay.io/trepel/httpbin:jsmadis".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MockserverSettings {
    pub image: String,
}

impl Default for MockserverSettings {
    fn default() -> Self {
        Self {
            image: "quay.io/mganisin/mockserver:latest".to_string(),
        }
    }
}

/// External Keycloak used as OIDC provider
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KeycloakSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub test_user: String,
    pub test_password: String,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            test_user: "testUser".to_string(),
            test_password: "testPassword".to_string(),
        }
    }
}

impl KeycloakSettings {
    /// Url, admin username and password, when all are configured
    pub fn admin(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.url.as_deref()?,
            self.username.as_deref()?,
            self.password.as_deref()?,
        ))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlPlaneSettings {
    /// cert-manager issuer for TLSPolicies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<IssuerSettings>,

    /// Secret with DNS provider credentials for DNSPolicies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_provider_secret: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IssuerSettings {
    pub name: String,
    #[serde(default = "default_issuer_kind")]
    pub kind: String,
}

fn default_issuer_kind() -> String {
    "ClusterIssuer".to_string()
}

impl IssuerSettings {
    pub fn reference(&self) -> Reference {
        Reference::new("cert-manager.io", self.kind.clone(), self.name.clone())
    }
}

impl Settings {
    /// Load from `path`, `$KUADRANT_TESTSUITE_CONFIG` or a standard location,
    /// then apply environment overrides
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let env = EnvConfig::load();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_deref().map(expand_path))
            .or_else(Self::find);

        let mut settings = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        env.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    /// Value at a dotted path, e.g. `authorino.deploy`; `None` when missing
    pub fn lookup(&self, path: &str) -> Option<serde_yaml::Value> {
        let document = serde_yaml::to_value(self).ok()?;
        let value = path
            .split('.')
            .try_fold(document, |value, key| value.get(key).cloned())?;
        (!value.is_null()).then_some(value)
    }

    /// Polling parameters for every readiness wait of the run
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .timeout_secs(self.wait_timeout_secs)
            .tolerate_failures(self.tolerate_failures)
    }
}
