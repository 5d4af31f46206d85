//! Connection and upgrade settings.
//!
//! Settings are read from a JSON file; the CLI overrides individual fields
//! from its arguments and environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};
use vellum_core::Vendor;

use crate::error::{DbError, Result};

/// Settings for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSettings {
    /// Connection URL (`sqlite::memory:`, `postgres://...`).
    pub url: String,

    /// Vendor; inferred from the URL scheme when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Vendor>,

    /// Schemas the loader reads. Empty means the vendor's default schema.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<String>,

    /// Application name stored in the version record.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application version stored in the version record.
    #[serde(default = "default_version")]
    pub app_version: Version,

    /// Per-module versions stored in the version record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, Version>,

    /// Declared model file (JSON).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<PathBuf>,

    /// Maximum pooled connections (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Per-command timeout in seconds (default: 30).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Upgrade even when the version record holds a failure.
    #[serde(default)]
    pub force: bool,
}

impl DbSettings {
    /// Settings for `url` with every other field at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            vendor: None,
            schemas: Vec::new(),
            app_name: default_app_name(),
            app_version: default_version(),
            modules: BTreeMap::new(),
            model: None,
            max_connections: default_max_connections(),
            command_timeout_secs: default_command_timeout(),
            force: false,
        }
    }

    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, does not parse, or is invalid.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Fails when the text does not parse or the settings are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(DbError::Config(String::from("url must not be empty")));
        }
        if self.max_connections == 0 {
            return Err(DbError::Config(String::from(
                "max_connections must be at least 1",
            )));
        }
        if self.command_timeout_secs == 0 {
            return Err(DbError::Config(String::from(
                "command_timeout_secs must be at least 1",
            )));
        }
        if self.app_name.trim().is_empty() {
            return Err(DbError::Config(String::from("app_name must not be empty")));
        }
        self.vendor().map(|_| ())
    }

    /// The vendor, explicit or inferred from the URL scheme.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] when the scheme is not recognized.
    pub fn vendor(&self) -> Result<Vendor> {
        if let Some(vendor) = self.vendor {
            return Ok(vendor);
        }
        let scheme = self.url.split(':').next().unwrap_or_default();
        scheme.parse().map_err(|_| {
            DbError::Config(format!(
                "cannot infer the vendor from '{}'; set `vendor`",
                self.url
            ))
        })
    }

    /// The per-command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn default_app_name() -> String {
    "vellum".to_string()
}

const fn default_version() -> Version {
    Version::new(0, 0, 0)
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_command_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let settings = DbSettings::from_json(r#"{"url": "sqlite::memory:"}"#).unwrap();
        assert_eq!(settings, DbSettings::new("sqlite::memory:"));
        assert_eq!(settings.vendor().unwrap(), Vendor::Sqlite);
        assert_eq!(settings.command_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_full_json() {
        let settings = DbSettings::from_json(
            r#"{
                "url": "postgres://app@localhost/library",
                "schemas": ["public", "audit"],
                "app_name": "library",
                "app_version": "2.1.0",
                "modules": {"catalog": "1.4.0"},
                "max_connections": 10,
                "force": true
            }"#,
        )
        .unwrap();
        assert_eq!(settings.vendor().unwrap(), Vendor::Postgres);
        assert_eq!(settings.schemas, ["public", "audit"]);
        assert_eq!(settings.app_version, Version::new(2, 1, 0));
        assert_eq!(settings.modules["catalog"], Version::new(1, 4, 0));
        assert!(settings.force);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            DbSettings::from_json(r#"{"url": ""}"#),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            DbSettings::from_json(r#"{"url": "oracle://x", "max_connections": 1}"#),
            Err(DbError::Config(_))
        ));
        assert!(matches!(
            DbSettings::from_json(r#"{"url": "sqlite::memory:", "max_connections": 0}"#),
            Err(DbError::Config(_))
        ));
        let explicit = DbSettings {
            vendor: Some(Vendor::MsSql),
            ..DbSettings::new("Server=tcp:db,1433")
        };
        assert_eq!(explicit.vendor().unwrap(), Vendor::MsSql);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.json");
        std::fs::write(&path, r#"{"url": "sqlite://library.db", "app_name": "library"}"#).unwrap();
        let settings = DbSettings::load(&path).unwrap();
        assert_eq!(settings.app_name, "library");
    }
}
