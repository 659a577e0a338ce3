//! Trigger error handling
//!
//! Admission failures map to a bare status code. Nothing about the failure
//! is echoed back to the caller; details only go to the log.

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use hookrun_core::TokenError;

#[derive(Debug)]
pub enum TriggerError {
    MethodNotAllowed(Method),
    MissingToken,
    InvalidToken(TokenError),
    QueueClosed,
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let status = match self {
            TriggerError::MethodNotAllowed(method) => {
                tracing::warn!("Invalid method: {}", method);
                StatusCode::METHOD_NOT_ALLOWED
            }
            TriggerError::MissingToken => {
                tracing::warn!("Missing token");
                StatusCode::UNAUTHORIZED
            }
            TriggerError::InvalidToken(err) => {
                tracing::warn!("Rejected token: {}", err);
                StatusCode::UNAUTHORIZED
            }
            TriggerError::QueueClosed => {
                tracing::error!("Work queue is closed, cannot accept task");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        status.into_response()
    }
}

impl From<TokenError> for TriggerError {
    fn from(err: TokenError) -> Self {
        TriggerError::InvalidToken(err)
    }
}

pub type TriggerResult<T> = Result<T, TriggerError>;
