//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{IssuerSettings, KeycloakSettings, Settings};
use crate::gateway::ExposerKind;

/// Configuration file locations (in order of precedence)
pub const CONFIG_LOCATIONS: &[&str] = &[
    "./kuadrant-testsuite.yaml",
    "./kuadrant-testsuite.yml",
    "./.kuadrant-testsuite.yaml",
    "./config/settings.local.yaml",
    "~/.config/kuadrant-testsuite/config.yaml",
    "~/.kuadrant-testsuite.yaml",
];

impl Settings {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.service_protection.project.is_empty() {
            anyhow::bail!("service_protection.project must not be empty");
        }
        if self.wait_timeout_secs == 0 {
            anyhow::bail!("wait_timeout_secs must be positive");
        }
        if let Some(url) = &self.keycloak.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("keycloak.url must be an http(s) URL, got '{url}'");
            }
        }
        if let Some(prefix) = &self.run_prefix {
            let valid = prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if !valid || prefix.len() > 8 {
                anyhow::bail!("run_prefix must be at most 8 lowercase alphanumerics, got '{prefix}'");
            }
        }

        Ok(())
    }

    /// Generate example configuration
    pub fn example() -> Self {
        let mut settings = Self::default();
        settings.service_protection.project2 = Some("kuadrant2".to_string());
        settings.keycloak = KeycloakSettings {
            url: Some("https://keycloak.example.com".to_string()),
            username: Some("admin".to_string()),
            password: Some("changeme".to_string()),
            ..Default::default()
        };
        settings.control_plane.issuer = Some(IssuerSettings {
            name: "selfsigned-issuer".to_string(),
            kind: "ClusterIssuer".to_string(),
        });
        settings.control_plane.dns_provider_secret = Some("aws-credentials".to_string());
        settings.default_exposer = ExposerKind::OpenShift;
        settings
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_example_is_valid() {
        let settings = Settings::example();
        settings.validate().unwrap();
        assert!(settings.keycloak.admin().is_some());
        assert!(settings.control_plane.issuer.is_some());
    }

    #[test]
    fn test_save_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let settings = Settings::example();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.run_prefix = Some("ci".to_string());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.run_prefix.as_deref(), Some("ci"));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "keycloak:\n  url: keycloak.local\n").unwrap();
        assert!(Settings::load(&path).is_err());

        std::fs::write(&path, "run_prefix: NOT-VALID\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "service_protection:\n  system_project: kuadrant-operators\n").unwrap();

        let settings = Settings::resolve(Some(&path)).unwrap();
        assert_eq!(settings.service_protection.system_project, "kuadrant-operators");
    }

    #[test]
    fn test_expand_path() {
        let path = expand_path("./test.yaml");
        assert_eq!(path, PathBuf::from("./test.yaml"));
    }
}
