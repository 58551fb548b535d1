use thiserror::Error;

use super::checkpoint::CheckpointError;
use super::config::ConfigError;
use super::storage::StorageError;
use crate::core::assembly::AssemblyError;
use crate::core::fitness::FitnessError;
use crate::core::fragspace::FragSpaceError;
use crate::core::models::candidate::Candidate;
use crate::core::models::graph::GraphError;
use crate::core::models::ids::TaskId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Fragment space error: {source}")]
    FragmentSpace {
        #[from]
        source: FragSpaceError,
    },

    #[error("Graph building failed ({context}): {source}")]
    Build {
        context: String,
        #[source]
        source: GraphError,
    },

    #[error("Structure assembly failed: {source}")]
    Assembly {
        #[from]
        source: AssemblyError,
    },

    #[error("Fitness evaluation failed: {source}")]
    Fitness {
        #[from]
        source: FitnessError,
    },

    #[error("External fitness provider failed: {0}")]
    ExternalProcess(String),

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },

    #[error("Checkpoint error: {source}")]
    Checkpoint {
        #[from]
        source: CheckpointError,
    },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: TaskId,
        #[source]
        source: Box<EngineError>,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn build(context: impl Into<String>, source: GraphError) -> Self {
        Self::Build {
            context: context.into(),
            source,
        }
    }

    /// Wraps this error with the context of the cyclic alternative it
    /// belongs to.
    pub fn in_context(self, context: impl Into<String>) -> Self {
        match self {
            Self::Build { context: inner, source } => Self::Build {
                context: format!("{}: {inner}", context.into()),
                source,
            },
            other => Self::Internal(format!("{}: {other}", context.into())),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// The failure of one task of a batch.
#[derive(Debug, Error)]
#[error("Task {task} failed: {source}")]
pub struct TaskError {
    pub task: TaskId,
    #[source]
    pub source: EngineError,
}

/// Abnormal end of a batch. Candidates completed before the batch ended are
/// handed back so that they can still be recorded.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch stopped after {} of {total} tasks", completed.len())]
    Stopped {
        completed: Vec<Candidate>,
        total: usize,
    },

    #[error("{error}")]
    TaskFailed {
        error: TaskError,
        completed: Vec<Candidate>,
    },

    #[error("Could not start worker pool: {0}")]
    Pool(String),
}

impl BatchError {
    pub fn completed(&self) -> &[Candidate] {
        match self {
            Self::Stopped { completed, .. } | Self::TaskFailed { completed, .. } => completed,
            Self::Pool(_) => &[],
        }
    }
}

impl From<BatchError> for EngineError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Stopped { .. } => Self::Cancelled,
            BatchError::TaskFailed { error, .. } => Self::TaskFailed {
                task: error.task,
                source: Box::new(error.source),
            },
            BatchError::Pool(message) => Self::Internal(message),
        }
    }
}
