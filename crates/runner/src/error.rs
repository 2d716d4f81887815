//! Error types for test orchestration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the process invoker
#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Test tool not found: {program}")]
    ToolNotFound { program: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Test tool exceeded its deadline of {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Infrastructure failure recorded on an ERROR summary.
///
/// Unlike [`InvokeError`] this is plain data: it is returned inside the
/// summary instead of being propagated.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("test tool not found: {program}")]
    ToolNotFound { program: String },

    #[error("test tool could not be run: {message}")]
    Spawn { message: String },

    #[error("test tool timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("test tool reported a tool-level error (exit code {code:?})")]
    Tool { code: Option<i32> },

    #[error("self-test artifact could not be prepared: {message}")]
    Prepare { message: String },
}

impl From<&InvokeError> for RunError {
    fn from(e: &InvokeError) -> Self {
        match e {
            InvokeError::ToolNotFound { program } => RunError::ToolNotFound {
                program: program.clone(),
            },
            InvokeError::Timeout(limit) => RunError::Timeout {
                seconds: limit.as_secs_f64(),
            },
            InvokeError::Spawn { .. } | InvokeError::Io(_) => RunError::Spawn {
                message: e.to_string(),
            },
        }
    }
}

/// Caller-side errors at the engine boundary
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Test target not found: {0}")]
    TargetNotFound(PathBuf),

    #[error("Invalid test file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] canary_common::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;
