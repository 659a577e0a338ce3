//! Task domain type

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::pipeline::PipelineDefinition;

/// One execution request for a pipeline
///
/// Tasks are intentionally not `Clone`: a task is moved through the work
/// queue into exactly one worker and dropped when its lifecycle ends.
#[derive(Debug)]
pub struct Task {
    pub id: Uuid,
    pub pipeline: Arc<PipelineDefinition>,
}

impl Task {
    /// Creates a task with a fresh identifier
    pub fn new(pipeline: Arc<PipelineDefinition>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_share_pipeline_definition() {
        let pipeline = Arc::new(PipelineDefinition::new("deploy", "echo hi"));

        let first = Task::new(Arc::clone(&pipeline));
        let second = Task::new(Arc::clone(&pipeline));

        assert_ne!(first.id, second.id);
        assert!(Arc::ptr_eq(&first.pipeline, &second.pipeline));
        assert_eq!(first.pipeline_name(), "deploy");
    }
}
