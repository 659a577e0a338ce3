//! Deploy key store
//!
//! Each pipeline owns one ed25519 keypair, stored as `<keys_dir>/<pipeline>`
//! and `<keys_dir>/<pipeline>.pub`. Keys are generated on first use and kept
//! for the lifetime of the deployment. The public half is only ever written
//! to the log, so operators can register it with the repository host.
//!
//! Provisioning is a plain check-then-act with no lock. That holds as long as
//! keys are provisioned one pipeline at a time during startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::process::{CommandError, CommandRunner, CommandSpec};

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to create key directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to check for existing key {path}: {source}")]
    Lookup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to generate deploy key for pipeline '{pipeline}': {source}")]
    Generate {
        pipeline: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to read public key {path}: {source}")]
    ReadPublicKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A provisioned deploy keypair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployKey {
    pub pipeline: String,
    pub private_key_path: PathBuf,
    pub public_key: String,
}

pub struct KeyStore {
    dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            dir: dir.into(),
            runner,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn private_key_path(&self, pipeline: &str) -> PathBuf {
        self.dir.join(pipeline)
    }

    pub fn public_key_path(&self, pipeline: &str) -> PathBuf {
        self.dir.join(format!("{}.pub", pipeline))
    }

    /// Returns the private key path for `pipeline`, generating the keypair
    /// first if it does not exist yet
    pub async fn ensure_key(&self, pipeline: &str) -> Result<PathBuf, KeyStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| KeyStoreError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let private_key_path = self.private_key_path(pipeline);
        let exists = tokio::fs::try_exists(&private_key_path)
            .await
            .map_err(|source| KeyStoreError::Lookup {
                path: private_key_path.clone(),
                source,
            })?;

        if exists {
            debug!("Using existing deploy key for pipeline {}", pipeline);
            return Ok(private_key_path);
        }

        let key = self.generate(pipeline).await?;
        info!(
            pipeline = %key.pipeline,
            "Public deploy key for pipeline {} is: {}",
            key.pipeline,
            key.public_key
        );

        Ok(key.private_key_path)
    }

    /// Reads back a keypair that has already been provisioned
    pub async fn load(&self, pipeline: &str) -> Result<DeployKey, KeyStoreError> {
        let public_key_path = self.public_key_path(pipeline);
        let public_key = tokio::fs::read_to_string(&public_key_path)
            .await
            .map_err(|source| KeyStoreError::ReadPublicKey {
                path: public_key_path,
                source,
            })?;

        Ok(DeployKey {
            pipeline: pipeline.to_string(),
            private_key_path: self.private_key_path(pipeline),
            public_key: public_key.trim().to_string(),
        })
    }

    async fn generate(&self, pipeline: &str) -> Result<DeployKey, KeyStoreError> {
        info!("Generating deploy key for pipeline {}", pipeline);

        let spec = CommandSpec::new("ssh-keygen")
            .arg("-t")
            .arg("ed25519")
            .arg("-f")
            .path_arg(&self.private_key_path(pipeline))
            .arg("-N")
            .arg("")
            .arg("-q")
            .arg("-C")
            .arg(format!("hookrun-{}", pipeline));

        self.runner
            .run(&spec)
            .await
            .map_err(|source| KeyStoreError::Generate {
                pipeline: pipeline.to_string(),
                source,
            })?;

        self.load(pipeline).await
    }
}
