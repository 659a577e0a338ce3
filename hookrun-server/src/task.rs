//! Task lifecycle
//!
//! A task runs through a fixed sequence of stages:
//!
//! 1. create an isolated temporary workspace
//! 2. materialize it (clone the repository with the pipeline's deploy key,
//!    or just make sure the directory exists)
//! 3. run the pipeline script inside it
//! 4. remove the workspace
//!
//! Every transition is logged under the task's span and reported through the
//! [`Notifier`]. A failing stage aborts the remaining ones, but cleanup always
//! runs. Nothing is retried and no stage has a timeout: a script that never
//! exits keeps its worker busy until the process is killed.

use hookrun_core::Task;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::keys::{KeyStore, KeyStoreError};
use crate::notifier::Notifier;
use crate::process::{CommandError, CommandRunner, CommandSpec, shell_quote};

const WORKSPACE_PREFIX: &str = "hookrun-";

/// Lifecycle stages that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateWorkspace,
    Materialize,
    RunScript,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CreateWorkspace => "create-workspace",
            Stage::Materialize => "materialize",
            Stage::RunScript => "run-script",
        };
        f.write_str(name)
    }
}

/// Why a task was aborted; the message doubles as the failure notification
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to create workspace: {0}")]
    CreateWorkspace(#[source] std::io::Error),

    #[error("Failed to create workspace: {0}")]
    PrepareWorkspace(#[source] std::io::Error),

    #[error("Failed to clone repository: {0}")]
    DeployKey(#[source] KeyStoreError),

    #[error("Failed to clone repository: {0}")]
    Clone(#[source] CommandError),

    #[error("Failed to run script: {0}")]
    Script(#[source] CommandError),
}

impl TaskError {
    pub fn stage(&self) -> Stage {
        match self {
            TaskError::CreateWorkspace(_) => Stage::CreateWorkspace,
            TaskError::PrepareWorkspace(_) | TaskError::DeployKey(_) | TaskError::Clone(_) => {
                Stage::Materialize
            }
            TaskError::Script(_) => Stage::RunScript,
        }
    }
}

/// What happened to the workspace at the end of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    NotCreated,
    Failed(String),
}

/// Summary of one finished task
#[derive(Debug)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub pipeline: String,
    /// Workspace the task ran in, if one was created
    pub workspace: Option<PathBuf>,
    pub result: Result<(), TaskError>,
    pub cleanup: Cleanup,
}

/// Filesystem settings for task execution
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Parent of task workspaces; the system temp dir when `None`
    pub workspace_root: Option<PathBuf>,
    /// Passed to ssh as `UserKnownHostsFile`
    pub known_hosts_file: PathBuf,
}

/// Runs tasks through their lifecycle
pub struct TaskExecutor {
    runner: Arc<dyn CommandRunner>,
    keys: Arc<KeyStore>,
    notifier: Notifier,
    settings: ExecutorSettings,
}

impl TaskExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        keys: Arc<KeyStore>,
        notifier: Notifier,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            runner,
            keys,
            notifier,
            settings,
        }
    }

    /// Runs `task` to completion
    pub async fn run(&self, task: Task) -> TaskReport {
        let span = info_span!("task", task_id = %task.id, pipeline = %task.pipeline.name);
        self.execute(task).instrument(span).await
    }

    async fn execute(&self, task: Task) -> TaskReport {
        info!("Running task. Pipeline: {}", task.pipeline_name());
        self.notifier
            .emit(format!("Running pipeline: {}", task.pipeline_name()))
            .await;

        let mut workspace = None;
        let result = self.run_stages(&task, &mut workspace).await;

        match &result {
            Ok(()) => {
                info!("Pipeline finished!");
                self.notifier.emit("Pipeline finished!").await;
            }
            Err(e) => {
                error!(stage = %e.stage(), "{}", e);
                self.notifier.emit(e.to_string()).await;
            }
        }

        let workspace_path = workspace.as_ref().map(|dir| dir.path().to_path_buf());
        let cleanup = remove_workspace(workspace);

        TaskReport {
            task_id: task.id,
            pipeline: task.pipeline.name.clone(),
            workspace: workspace_path,
            result,
            cleanup,
        }
    }

    async fn run_stages(
        &self,
        task: &Task,
        workspace: &mut Option<TempDir>,
    ) -> Result<(), TaskError> {
        let dir = self.create_workspace().map_err(TaskError::CreateWorkspace)?;
        let path = dir.path().to_path_buf();
        info!("Workspace path: {}", path.display());
        *workspace = Some(dir);

        self.materialize(task, &path).await?;

        self.notifier.emit("Running script").await;
        info!("Running script");
        let script = CommandSpec::shell(task.pipeline.script.as_str()).current_dir(&path);
        self.runner.run(&script).await.map_err(TaskError::Script)?;

        Ok(())
    }

    fn create_workspace(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        match &self.settings.workspace_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn materialize(&self, task: &Task, path: &Path) -> Result<(), TaskError> {
        let Some(repository) = &task.pipeline.repository else {
            debug!("No repository configured, using empty workspace");
            return tokio::fs::create_dir_all(path)
                .await
                .map_err(TaskError::PrepareWorkspace);
        };

        self.notifier.emit("Cloning repository").await;
        let private_key = self
            .keys
            .ensure_key(task.pipeline_name())
            .await
            .map_err(TaskError::DeployKey)?;

        info!("Cloning repository: {}", repository);
        let clone = CommandSpec::new("git")
            .arg("clone")
            .arg(repository.as_str())
            .path_arg(path)
            .env(
                "GIT_SSH_COMMAND",
                ssh_command(&private_key, &self.settings.known_hosts_file),
            );
        self.runner.run(&clone).await.map_err(TaskError::Clone)?;

        info!("Repository cloned");
        Ok(())
    }
}

/// ssh invocation used by git: deploy key only, strict host checking, never prompts
fn ssh_command(private_key: &Path, known_hosts: &Path) -> String {
    format!(
        "ssh -i {} -o StrictHostKeyChecking=yes -o BatchMode=yes -o IdentitiesOnly=yes -o UserKnownHostsFile={}",
        shell_quote(&private_key.to_string_lossy()),
        shell_quote(&known_hosts.to_string_lossy()),
    )
}

fn remove_workspace(workspace: Option<TempDir>) -> Cleanup {
    let Some(dir) = workspace else {
        debug!("No workspace to remove");
        return Cleanup::NotCreated;
    };

    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => {
            info!("Removed workspace: {}", path.display());
            Cleanup::Removed
        }
        Err(e) => {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
            Cleanup::Failed(e.to_string())
        }
    }
}
