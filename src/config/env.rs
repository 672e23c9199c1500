//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use tracing::warn;

use super::Settings;
use crate::gateway::ExposerKind;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "KUADRANT_TESTSUITE";

/// Overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// KUADRANT_TESTSUITE_PROJECT
    pub project: Option<String>,
    /// KUADRANT_TESTSUITE_PROJECT2
    pub project2: Option<String>,
    pub system_project: Option<String>,
    pub keycloak_url: Option<String>,
    pub keycloak_username: Option<String>,
    pub keycloak_password: Option<String>,
    /// KUADRANT_TESTSUITE_EXPOSER, `openshift` or `loadbalancer`
    pub exposer: Option<String>,
    /// KUADRANT_TESTSUITE_CONFIG
    pub config_file: Option<String>,
    pub run_prefix: Option<String>,
    pub context: Option<String>,
    /// Kubeconfig from KUBECONFIG, read by the kube client itself
    pub kubeconfig: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            project: get_env("PROJECT"),
            project2: get_env("PROJECT2"),
            system_project: get_env("SYSTEM_PROJECT"),
            keycloak_url: get_env("KEYCLOAK_URL"),
            keycloak_username: get_env("KEYCLOAK_USERNAME"),
            keycloak_password: get_env("KEYCLOAK_PASSWORD"),
            exposer: get_env("EXPOSER"),
            config_file: get_env("CONFIG"),
            run_prefix: get_env("RUN_PREFIX"),
            context: get_env("CONTEXT"),
            kubeconfig: env::var("KUBECONFIG").ok(),
        }
    }

    /// Check if any override is set
    pub fn has_any(&self) -> bool {
        self.project.is_some()
            || self.project2.is_some()
            || self.system_project.is_some()
            || self.keycloak_url.is_some()
            || self.keycloak_username.is_some()
            || self.keycloak_password.is_some()
            || self.exposer.is_some()
            || self.config_file.is_some()
            || self.run_prefix.is_some()
            || self.context.is_some()
    }

    /// Overwrite the settings with every variable that is set
    pub fn apply(&self, settings: &mut Settings) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt(target: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        set(&mut settings.service_protection.project, &self.project);
        set_opt(&mut settings.service_protection.project2, &self.project2);
        set(&mut settings.service_protection.system_project, &self.system_project);
        set_opt(&mut settings.keycloak.url, &self.keycloak_url);
        set_opt(&mut settings.keycloak.username, &self.keycloak_username);
        set_opt(&mut settings.keycloak.password, &self.keycloak_password);
        set_opt(&mut settings.run_prefix, &self.run_prefix);
        set_opt(&mut settings.cluster.context, &self.context);

        if let Some(exposer) = &self.exposer {
            match exposer.parse::<ExposerKind>() {
                Ok(kind) => settings.default_exposer = kind,
                Err(e) => warn!("Ignoring {ENV_PREFIX}_EXPOSER: {}", e),
            }
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_PROJECT:           {:?}", ENV_PREFIX, self.project);
        println!("  {}_PROJECT2:          {:?}", ENV_PREFIX, self.project2);
        println!("  {}_SYSTEM_PROJECT:    {:?}", ENV_PREFIX, self.system_project);
        println!("  {}_KEYCLOAK_URL:      {:?}", ENV_PREFIX, self.keycloak_url);
        println!("  {}_KEYCLOAK_USERNAME: {:?}", ENV_PREFIX, self.keycloak_username);
        println!(
            "  {}_KEYCLOAK_PASSWORD: {}",
            ENV_PREFIX,
            if self.keycloak_password.is_some() { "<set>" } else { "None" }
        );
        println!("  {}_EXPOSER:           {:?}", ENV_PREFIX, self.exposer);
        println!("  {}_CONFIG:            {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_RUN_PREFIX:        {:?}", ENV_PREFIX, self.run_prefix);
        println!("  {}_CONTEXT:           {:?}", ENV_PREFIX, self.context);
        println!("  KUBECONFIG:                          {:?}", self.kubeconfig);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Builder for setting environment variables (useful for testing)
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn project(self, project: impl Into<String>) -> Self {
        self.var("PROJECT", project)
    }

    pub fn project2(self, project: impl Into<String>) -> Self {
        self.var("PROJECT2", project)
    }

    pub fn keycloak_url(self, url: impl Into<String>) -> Self {
        self.var("KEYCLOAK_URL", url)
    }

    pub fn keycloak_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.var("KEYCLOAK_USERNAME", username)
            .var("KEYCLOAK_PASSWORD", password)
    }

    pub fn exposer(self, exposer: impl Into<String>) -> Self {
        self.var("EXPOSER", exposer)
    }

    pub fn run_prefix(self, prefix: impl Into<String>) -> Self {
        self.var("RUN_PREFIX", prefix)
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all KUADRANT_TESTSUITE environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PROJECT            Project the suite creates objects in");
    println!("  {ENV_PREFIX}_PROJECT2           Secondary project");
    println!("  {ENV_PREFIX}_SYSTEM_PROJECT     Project Kuadrant is installed in");
    println!("  {ENV_PREFIX}_KEYCLOAK_URL       Keycloak server URL");
    println!("  {ENV_PREFIX}_KEYCLOAK_USERNAME  Keycloak admin username");
    println!("  {ENV_PREFIX}_KEYCLOAK_PASSWORD  Keycloak admin password");
    println!("  {ENV_PREFIX}_EXPOSER            Exposer (openshift, loadbalancer)");
    println!("  {ENV_PREFIX}_CONFIG             Path to configuration file");
    println!("  {ENV_PREFIX}_RUN_PREFIX         Prefix of generated object names");
    println!("  {ENV_PREFIX}_CONTEXT            Kubeconfig context");
    println!("  KUBECONFIG                         Path to kubeconfig file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_PROJECT=kuadrant");
    println!("  export {ENV_PREFIX}_KEYCLOAK_URL=https://keycloak.example.com");
    println!("  kuadrant-testsuite run --scenario 1");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(!config.has_any());
        let mut settings = Settings::default();
        config.apply(&mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .project2("second")
            .keycloak_url("http://keycloak.local")
            .keycloak_credentials("admin", "pw")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.project2.as_deref(), Some("second"));
        assert_eq!(config.keycloak_url.as_deref(), Some("http://keycloak.local"));
        assert!(config.has_any());
    }

    #[test]
    fn test_apply_overrides() {
        let config = EnvConfig {
            project: Some("other".to_string()),
            exposer: Some("loadbalancer".to_string()),
            run_prefix: Some("nightly".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply(&mut settings);

        assert_eq!(settings.service_protection.project, "other");
        assert_eq!(settings.default_exposer, ExposerKind::LoadBalancer);
        assert_eq!(settings.run_prefix.as_deref(), Some("nightly"));
        assert_eq!(settings.service_protection.system_project, "kuadrant-system");
    }

    #[test]
    fn test_unknown_exposer_is_ignored() {
        let config = EnvConfig {
            exposer: Some("ingress".to_string()),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply(&mut settings);
        assert_eq!(settings.default_exposer, ExposerKind::OpenShift);
    }
}
