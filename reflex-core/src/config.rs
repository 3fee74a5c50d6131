//! Configuration system for reflex.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> explicit overrides. The user config
//! lives at `~/.config/reflex/config.toml` (platform equivalent via
//! `directories`).

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    /// Containment workflow settings.
    pub containment: ContainmentConfig,
    /// Parameter values served by the configuration-backed parameter source.
    pub parameters: HashMap<String, String>,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Settings shared by every containment workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    /// Parameter holding the quarantine network-group identifier.
    pub quarantine_group_parameter: String,
    /// Parameter holding the notification channel identifier.
    pub notification_channel_parameter: String,
    /// Tag key marking a resource as under remediation.
    pub lock_tag_key: String,
    /// Value written to the lock tag.
    pub lock_tag_value: String,
    /// What happens to the lock tag when a workflow fails.
    pub lock_release: LockReleasePolicy,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            quarantine_group_parameter: "/reflex/quarantine-security-group-id".into(),
            notification_channel_parameter: "/reflex/forensics-topic-arn".into(),
            lock_tag_key: "reflex:remediation-in-progress".into(),
            lock_tag_value: "true".into(),
            lock_release: LockReleasePolicy::default(),
        }
    }
}

impl ContainmentConfig {
    /// Reject settings no workflow can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("quarantine_group_parameter", &self.quarantine_group_parameter),
            (
                "notification_channel_parameter",
                &self.notification_channel_parameter,
            ),
            ("lock_tag_key", &self.lock_tag_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("containment.{name} must not be empty"),
                });
            }
        }
        Ok(())
    }
}

/// Lock-tag handling on a FAILED workflow.
///
/// DONE, SKIPPED and manual-intervention halts never clear the tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReleasePolicy {
    /// Leave the tag in place; an operator must clear it before a retry.
    #[default]
    Retain,
    /// Remove the tag so a later invocation can retry automatically.
    ClearOnFailure,
}

/// Log output settings for the invocation shim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Format of the stderr log stream.
    pub format: LogFormat,
    /// Directory for an additional daily-rotated JSON log file.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Json,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `REFLEX_`, `__` separates sections)
/// 3. Explicit config file
/// 4. User config (`~/.config/reflex/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&ReflexConfig>,
) -> Result<ReflexConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ReflexConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file {} does not exist", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // REFLEX_CONTAINMENT__LOCK_RELEASE=clear_on_failure, etc.
    figment = figment.merge(Env::prefixed("REFLEX_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: ReflexConfig = figment.extract().map_err(Box::new)?;
    config.containment.validate()?;
    Ok(config)
}

/// Location of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "reflex", "reflex")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
