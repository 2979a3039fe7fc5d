//! Driver configuration.
//!
//! The configuration is a JSON document with three sections:
//!
//! ```json
//! {
//!   "driver": { "rootpath": "/var/lib/confvol" },
//!   "backend": {
//!     "type": "etcd",
//!     "endpoints": "http://10.0.0.1:2379, http://10.0.0.2:2379",
//!     "timeout": 30,
//!     "auth": { "user": "root", "password": "secret" }
//!   },
//!   "generator": { "disabled": false }
//! }
//! ```
//!
//! Missing fields keep their defaults. Loading never validates; call
//! [`Configuration::check_integrity`] before using a loaded configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The only backend type currently supported.
pub const ETCD_BACKEND: &str = "etcd";

/// Default backend connect timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Loading empty json data")]
    Empty,

    #[error("driver.rootpath directory did not exist")]
    RootPathMissing { path: PathBuf },

    #[error("backend.type only supports 'etcd' at the moment")]
    UnsupportedBackend { kind: String },

    #[error("backend.endpoints is a neccessary field")]
    EndpointsRequired,

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub driver: DriverConfig,
    pub backend: BackendConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory under which volumes are materialized.
    #[serde(rename = "rootpath")]
    pub root_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Comma-separated endpoint list.
    pub endpoints: String,
    /// Connect timeout in seconds.
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: ETCD_BACKEND.to_string(),
            endpoints: String::new(),
            timeout: DEFAULT_TIMEOUT_SECS,
            auth: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Turns template rendering off for every volume.
    pub disabled: bool,
}

impl Configuration {
    /// A configuration with all defaults applied.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loading configuration from {}", path.display());
        Self::load_from_str(&data)
    }

    pub fn load_from_str(data: &str) -> Result<Self, ConfigError> {
        if data.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        Ok(serde_json::from_str(data)?)
    }

    /// Validate the configuration, returning every violation found.
    ///
    /// Violations are reported in a fixed order: root path, backend type,
    /// endpoints.
    pub fn check_integrity(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        let root = &self.driver.root_path;
        if !fs::metadata(root).map(|m| m.is_dir()).unwrap_or(false) {
            errors.push(ConfigError::RootPathMissing { path: root.clone() });
        }
        if self.backend.kind != ETCD_BACKEND {
            errors.push(ConfigError::UnsupportedBackend {
                kind: self.backend.kind.clone(),
            });
        }
        if self.backend_endpoint_list().is_empty() {
            errors.push(ConfigError::EndpointsRequired);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The configured endpoints, trimmed, with empty entries dropped.
    pub fn backend_endpoint_list(&self) -> Vec<String> {
        self.backend
            .endpoints
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout)
    }
}
