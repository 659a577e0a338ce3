//! Server configuration
//!
//! Loaded once from a YAML file at startup and treated as an immutable
//! snapshot for the lifetime of the process.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//!   jwtSecret: change-me
//!   workers: 2
//!   notificationCommand: 'curl -fsS -d "$MESSAGE" https://ntfy.sh/deploys'
//! pipelines:
//!   - name: deploy
//!     repository: git@github.com:acme/site.git
//!     script: ./deploy.sh
//! ```

use hookrun_core::{PipelineDefinition, PipelineRegistry, RegistryError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Work queue slots reserved per worker.
pub const QUEUE_SLOTS_PER_WORKER: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<RegistryError> for ConfigError {
    fn from(err: RegistryError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    /// Shared secret used to sign and verify trigger tokens
    pub jwt_secret: String,

    /// Number of concurrent workers executing tasks
    pub workers: usize,

    /// Shell command run once per notification, with the text in `$MESSAGE`
    #[serde(default)]
    pub notification_command: Option<String>,

    /// Directory holding one deploy keypair per pipeline
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,

    /// known_hosts file used for strict host key checking during clones
    #[serde(default = "default_known_hosts_file")]
    pub known_hosts_file: PathBuf,

    /// Parent directory for task workspaces (system temp dir when unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Notifications that may be pending before emitters have to wait
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("keys")
}

fn default_known_hosts_file() -> PathBuf {
    PathBuf::from("known_hosts")
}

fn default_notification_buffer() -> usize {
    1
}

impl Config {
    /// Reads, normalizes and validates the configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Trims names and repositories; blank optional values become `None`
    fn normalize(&mut self) {
        for pipeline in &mut self.pipelines {
            pipeline.name = pipeline.name.trim().to_string();
            pipeline.repository = pipeline
                .repository
                .take()
                .map(|repo| repo.trim().to_string())
                .filter(|repo| !repo.is_empty());
        }

        self.server.notification_command = self
            .server
            .notification_command
            .take()
            .filter(|cmd| !cmd.trim().is_empty());
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host cannot be empty".into()));
        }

        if server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be greater than 0".into()));
        }

        if server.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "server.jwtSecret cannot be empty".into(),
            ));
        }

        if server.workers < 1 {
            return Err(ConfigError::Invalid(format!(
                "invalid number of workers: {}",
                server.workers
            )));
        }

        if server.notification_buffer < 1 {
            return Err(ConfigError::Invalid(
                "server.notificationBuffer must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for pipeline in &self.pipelines {
            validate_pipeline_name(&pipeline.name)?;

            if pipeline.script.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "pipeline '{}' has an empty script",
                    pipeline.name
                )));
            }

            if !seen.insert(pipeline.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate pipeline name: {}",
                    pipeline.name
                )));
            }
        }

        Ok(())
    }

    /// Capacity of the shared work queue
    pub fn work_queue_capacity(&self) -> usize {
        self.server.workers * QUEUE_SLOTS_PER_WORKER
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Builds the name -> definition mapping endpoints are registered from
    pub fn registry(&self) -> Result<PipelineRegistry, ConfigError> {
        Ok(PipelineRegistry::new(self.pipelines.iter().cloned())?)
    }
}

/// Pipeline names become a URL path segment and a key file name
fn validate_pipeline_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Invalid("pipeline name cannot be empty".into()));
    }

    if name.starts_with('.') {
        return Err(ConfigError::Invalid(format!(
            "pipeline name '{}' cannot start with '.'",
            name
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ConfigError::Invalid(format!(
            "pipeline name '{}' contains invalid character {:?}",
            name, c
        )));
    }

    Ok(())
}
