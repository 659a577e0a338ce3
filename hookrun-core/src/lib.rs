//! Hookrun Core
//!
//! Core types shared by the hookrun services.
//!
//! This crate contains:
//! - Domain types: pipeline definitions and the tasks derived from them
//! - Auth: signing and verification of trigger tokens

pub mod auth;
pub mod domain;

pub use auth::{TokenError, TokenSigner};
pub use domain::pipeline::{PipelineDefinition, PipelineRegistry, RegistryError};
pub use domain::task::Task;
