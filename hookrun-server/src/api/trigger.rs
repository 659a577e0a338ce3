//! Trigger endpoint
//!
//! `POST /<pipeline>?token=<jwt>` authenticates the caller and enqueues a
//! task. The response is only sent once the task is in the queue, so a full
//! queue holds the request open until a worker frees a slot.

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{Method, StatusCode},
};
use hookrun_core::{PipelineDefinition, Task, TokenSigner};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::error::{TriggerError, TriggerResult};
use crate::worker::WorkQueue;

/// Per-pipeline handler state
pub struct TriggerEndpoint {
    pub pipeline: Arc<PipelineDefinition>,
    pub queue: WorkQueue,
    pub signer: Arc<TokenSigner>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    pub token: Option<String>,
}

/// ANY /<pipeline>
pub async fn trigger_pipeline(
    State(endpoint): State<Arc<TriggerEndpoint>>,
    method: Method,
    params: Result<Query<TriggerParams>, QueryRejection>,
) -> TriggerResult<StatusCode> {
    if method != Method::POST {
        return Err(TriggerError::MethodNotAllowed(method));
    }

    let token = params
        .ok()
        .and_then(|Query(params)| params.token)
        .filter(|token| !token.is_empty())
        .ok_or(TriggerError::MissingToken)?;

    endpoint.signer.verify(&token)?;

    let task = Task::new(Arc::clone(&endpoint.pipeline));
    let task_id = task.id;

    tracing::debug!(
        "Queueing task {} for pipeline {} ({} pending)",
        task_id,
        endpoint.pipeline.name,
        endpoint.queue.pending()
    );

    endpoint
        .queue
        .enqueue(task)
        .await
        .map_err(|_| TriggerError::QueueClosed)?;

    tracing::info!(
        task_id = %task_id,
        "Accepted trigger for pipeline {}",
        endpoint.pipeline.name
    );

    Ok(StatusCode::OK)
}
