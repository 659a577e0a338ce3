//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Pipeline definition
///
/// A named deploy target: an optional git repository checked out into the
/// task workspace, and a shell script run inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub script: String,
}

impl PipelineDefinition {
    /// Creates a definition without a repository
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
            script: script.into(),
        }
    }

    /// Sets the repository cloned before the script runs
    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate pipeline name: {0}")]
    DuplicatePipeline(String),
}

/// Immutable set of pipeline definitions with unique names
///
/// Built once at startup. Iteration follows the order the definitions were
/// supplied in, which is the order endpoints get registered.
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    ordered: Vec<Arc<PipelineDefinition>>,
}

impl PipelineRegistry {
    pub fn new(
        definitions: impl IntoIterator<Item = PipelineDefinition>,
    ) -> Result<Self, RegistryError> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();

        for definition in definitions {
            if !seen.insert(definition.name.clone()) {
                return Err(RegistryError::DuplicatePipeline(definition.name));
            }
            ordered.push(Arc::new(definition));
        }

        Ok(Self { ordered })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PipelineDefinition>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
