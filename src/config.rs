//! Configuration for the engine manager.
//!
//! The manager is configured from a single YAML file (see `--config`), parsed
//! with serde. Schema validation beyond what serde enforces happens upstream
//! of this process.
//!
//! # Example
//!
//! ```yaml
//! id: default
//! service_url: https://lintdock.example.com
//! private_api_port: 17013
//! repository_auth:
//!   username: ci
//!   password_env: REGISTRY_PW
//! engines:
//!   eslint:
//!     image: lintdock/eslint:latest
//!     command: "node server.js --port 80"
//!     import_env: [HTTP_PROXY]
//!     meta:
//!       languages: [javascript, typescript]
//! ui:
//!   image: lintdock/ui:latest
//! ```

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix marking a repository-auth field whose value names a process
/// environment variable holding the real value.
const ENV_SUFFIX: &str = "_env";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

/// Repository authentication, a free-form field map.
///
/// Any key ending in `_env` is resolved by reading the process environment
/// variable named by its value; the resolved key drops the suffix. See
/// [`resolve_repository_auth`].
pub type RepositoryAuth = HashMap<String, String>;

/// Top-level manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagerConfig {
    /// Unique manager id; scopes the owner label on the network and volume.
    #[serde(default = "default_id")]
    pub id: String,

    /// Public URL under which this service is reachable.
    pub service_url: String,

    /// Port of the private API exposed to engines over the manager network.
    pub private_api_port: u16,

    /// Default registry auth, overridable per engine.
    #[serde(default)]
    pub repository_auth: RepositoryAuth,

    /// Engines to install, keyed by name. BTreeMap for stable order in logs;
    /// installs themselves run concurrently.
    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,

    /// Optional UI engine, served at the root path instead of `/engine/<name>`.
    #[serde(default)]
    pub ui: Option<EngineConfig>,
}

fn default_id() -> String {
    "default".to_string()
}

/// Configuration for a single engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Image reference to pull and run.
    pub image: String,

    /// Command line for the container. Split on whitespace, no quoting
    /// support.
    #[serde(default)]
    pub command: Option<String>,

    /// Port the engine listens on inside the manager network.
    #[serde(default = "default_engine_port")]
    pub port: u16,

    /// Explicit `NAME=value` environment entries.
    #[serde(default)]
    pub env: Vec<String>,

    /// Names of manager-process environment variables to import verbatim.
    #[serde(default)]
    pub import_env: Vec<String>,

    /// Host bind specs (`/host/path:/container/path`).
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Working directory inside the container.
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Per-engine registry auth override. Takes precedence over the
    /// manager-level default when non-empty.
    #[serde(default)]
    pub repository_auth: RepositoryAuth,

    /// Free-form metadata surfaced by `GET /engines`; `meta.languages` drives
    /// pipeline fan-out.
    #[serde(default)]
    pub meta: serde_json::Value,
}

fn default_engine_port() -> u16 {
    80
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image: String::new(),
            command: None,
            port: default_engine_port(),
            env: Vec::new(),
            import_env: Vec::new(),
            volumes: Vec::new(),
            working_dir: None,
            repository_auth: RepositoryAuth::new(),
            meta: serde_json::Value::Null,
        }
    }
}

impl ManagerConfig {
    /// Load a manager configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Registry auth for an engine: the engine-level override wins when it
    /// has any fields, otherwise the manager-level default applies.
    pub fn auth_for<'a>(&'a self, engine: &'a EngineConfig) -> &'a RepositoryAuth {
        if engine.repository_auth.is_empty() {
            &self.repository_auth
        } else {
            &engine.repository_auth
        }
    }
}

/// Resolve `_env`-suffixed repository-auth fields from the process
/// environment.
///
/// `{user: "u", password_env: "REGISTRY_PW"}` with `REGISTRY_PW=secret` in
/// the environment resolves to `{user: "u", password: "secret"}`. An unset
/// variable resolves to the empty string.
pub fn resolve_repository_auth(auth: &RepositoryAuth) -> RepositoryAuth {
    auth.iter()
        .map(|(key, value)| {
            if let Some(field) = key.strip_suffix(ENV_SUFFIX) {
                (field.to_string(), env::var(value).unwrap_or_default())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
