//! Notifier
//!
//! Task progress messages flow through one shared channel into a single
//! consumer task. When a notification command is configured the consumer
//! runs it once per message with the text in `$MESSAGE`; otherwise messages
//! are drained and dropped.
//!
//! The channel is bounded (one slot by default) and emitters await the send,
//! so delivery is serialized and a slow notification command holds up every
//! task that tries to report progress.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::process::{CommandRunner, CommandSpec};

/// Environment variable carrying the message text.
pub const MESSAGE_ENV: &str = "MESSAGE";

/// Cloneable handle used to emit progress messages
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<String>,
}

impl Notifier {
    /// Creates a notifier together with the receiving end of its channel
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Waits until the consumer has room for the message
    pub async fn emit(&self, message: impl Into<String>) {
        if let Err(err) = self.tx.send(message.into()).await {
            warn!("Notification dropped, notifier is gone: {}", err.0);
        }
    }
}

/// Consumer side: turns messages into notification command runs
pub struct NotificationSink {
    command: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl NotificationSink {
    pub fn new(command: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { command, runner }
    }

    /// Delivers one message; failures are logged and otherwise ignored
    pub async fn deliver(&self, message: &str) {
        let Some(command) = &self.command else {
            debug!("No notification command configured, dropping: {}", message);
            return;
        };

        let spec = CommandSpec::shell(command.as_str()).env(MESSAGE_ENV, message);
        if let Err(e) = self.runner.run(&spec).await {
            warn!("Failed to send notification: {}", e);
        }
    }

    /// Consumes messages until every [`Notifier`] handle is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<String>) {
        while let Some(message) = rx.recv().await {
            self.deliver(&message).await;
        }
        info!("Notification channel closed");
    }
}

/// Starts the consumer task and returns the handle emitters use
pub fn spawn(
    command: Option<String>,
    runner: Arc<dyn CommandRunner>,
    buffer: usize,
) -> (Notifier, JoinHandle<()>) {
    let (notifier, rx) = Notifier::channel(buffer);
    let sink = NotificationSink::new(command, runner);
    let handle = tokio::spawn(sink.run(rx));
    (notifier, handle)
}
