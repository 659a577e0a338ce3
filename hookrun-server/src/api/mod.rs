//! API Module
//!
//! HTTP surface of the server: one trigger endpoint per configured pipeline.

pub mod error;
pub mod trigger;

use axum::{Router, routing::any};
use hookrun_core::{PipelineRegistry, TokenSigner};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::keys::{KeyStore, KeyStoreError};
use crate::worker::WorkQueue;
use trigger::TriggerEndpoint;

/// Create the router with one endpoint per pipeline
///
/// Pipelines are registered in registry order. Each pipeline's deploy key is
/// provisioned before its endpoint is added, so no trigger can ever reach a
/// pipeline without a key.
pub async fn create_router(
    registry: &PipelineRegistry,
    keys: &KeyStore,
    queue: WorkQueue,
    signer: Arc<TokenSigner>,
) -> Result<Router, KeyStoreError> {
    let mut router = Router::new();

    for pipeline in registry.iter() {
        tracing::info!("Registering pipeline: {}", pipeline.name);
        keys.ensure_key(&pipeline.name).await?;

        let endpoint = Arc::new(TriggerEndpoint {
            pipeline: Arc::clone(pipeline),
            queue: queue.clone(),
            signer: Arc::clone(&signer),
        });

        router = router.merge(
            Router::new()
                .route(&format!("/{}", pipeline.name), any(trigger::trigger_pipeline))
                .with_state(endpoint),
        );
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}
