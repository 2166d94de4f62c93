use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arbor_namespace::NamespaceConfig;
use arbor_store::StoreConfig;

use crate::error::{ServiceError, ServiceResult};

pub const ENV_DATA_ROOT: &str = "ARBOR_DATA_ROOT";
pub const ENV_DOMAIN: &str = "ARBOR_DOMAIN";
pub const ENV_ALLOW_ANONYMOUS: &str = "ARBOR_ALLOW_ANONYMOUS";

/// Who may create new domains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewDomainPolicy {
    Anonymous,
    #[default]
    Authenticated,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub drain_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1000,
            drain_interval_ms: 1000,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms.max(1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub allow_anonymous: bool,
    pub new_domain_policy: NewDomainPolicy,
    /// TOML user table (`[users] name = id`).
    pub users_file: Option<PathBuf>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: true,
            new_domain_policy: NewDomainPolicy::Authenticated,
            users_file: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub namespace: NamespaceConfig,
    pub store: StoreConfig,
    pub watch: WatchConfig,
    pub access: AccessConfig,
}

impl ServiceConfig {
    pub fn from_toml(text: &str) -> ServiceResult<Self> {
        toml::from_str(text).map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> ServiceResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> ServiceResult<()> {
        if let Some(root) = var(ENV_DATA_ROOT) {
            self.namespace.data_root = PathBuf::from(root);
        }
        if let Some(domain) = var(ENV_DOMAIN) {
            self.namespace.domain_suffix = domain;
        }
        if let Some(flag) = var(ENV_ALLOW_ANONYMOUS) {
            self.access.allow_anonymous = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ServiceError::Config(format!(
                        "{ENV_ALLOW_ANONYMOUS} must be true or false, got {other:?}"
                    )))
                }
            };
        }
        Ok(())
    }
}
