//! Work queue and worker pool
//!
//! Trigger endpoints push tasks onto a bounded FIFO queue; a fixed number of
//! workers pull them off one at a time and run each to completion. When the
//! queue is full, producers wait for a free slot instead of dropping work.

use hookrun_core::Task;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::task::{Cleanup, TaskExecutor};

#[derive(Debug, Error)]
#[error("work queue is closed")]
pub struct QueueClosed(pub Task);

/// Producer side of the shared work queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<Task>,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` pending tasks
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Task>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a task, waiting for a free slot when the queue is full
    pub async fn enqueue(&self, task: Task) -> Result<(), QueueClosed> {
        self.tx.send(task).await.map_err(|e| QueueClosed(e.0))
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Tasks currently waiting for a worker
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Fixed set of workers draining the work queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(workers: usize, rx: mpsc::Receiver<Task>, executor: Arc<TaskExecutor>) -> Self {
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let executor = Arc::clone(&executor);
                tokio::spawn(worker_loop(worker_id, rx, executor))
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit, which happens once all queue
    /// producers are dropped and the queue is empty
    #[allow(dead_code)]
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker panicked: {}", e);
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    executor: Arc<TaskExecutor>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        // Release the receiver before running so idle workers can take the next task
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else {
            break;
        };

        debug!("Worker {} picked up task {}", worker_id, task.id);
        let report = executor.run(task).await;

        match &report.result {
            Ok(()) => info!(
                task_id = %report.task_id,
                "Task for pipeline {} succeeded",
                report.pipeline
            ),
            Err(e) => info!(
                task_id = %report.task_id,
                "Task for pipeline {} failed at {}",
                report.pipeline,
                e.stage()
            ),
        }
        if let (Cleanup::Failed(reason), Some(workspace)) = (&report.cleanup, &report.workspace) {
            warn!(
                task_id = %report.task_id,
                "Workspace {} left behind: {}",
                workspace.display(),
                reason
            );
        }
    }

    debug!("Worker {} stopped, work queue closed", worker_id);
}
