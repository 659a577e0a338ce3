//! Core domain types
//!
//! Pipelines are loaded once at startup and never change afterwards.
//! Tasks are the runtime instances created for every accepted trigger.

pub mod pipeline;
pub mod task;
