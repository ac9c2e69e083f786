//! Error types for the nuflows orchestration library.
//!
//! Uses `thiserror` for structured error variants covering the environment
//! preconditions, configuration composition, stage execution, and queue
//! submission domains. Nothing here is ever retried: every error terminates
//! the operation that produced it.

use crate::stage::StageKind;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("required environment variable {var} is not set")]
    MissingRootVar { var: &'static str },

    #[error("invalid override '{entry}': expected key=value")]
    InvalidOverride { entry: String },

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("{stage} stage failed (exit {status}): {stderr}")]
    StageFailed {
        stage: StageKind,
        status: i32,
        stderr: String,
    },

    #[error("{stage} stage could not be spawned: {message}")]
    StageSpawn { stage: StageKind, message: String },

    #[error("{stage} stage timed out after {secs}s")]
    StageTimeout { stage: StageKind, secs: u64 },

    #[error("job submission failed: {0}")]
    Submit(String),

    #[error("data file not found: {}", .0.display())]
    DataFileMissing(PathBuf),

    #[error("data path is not a regular file: {}", .0.display())]
    DataNotAFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<figment::Error> for OrchestratorError {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

impl OrchestratorError {
    pub fn submit(msg: impl Into<String>) -> Self {
        Self::Submit(msg.into())
    }

    /// Whether this error is the fatal missing-precondition case that must be
    /// reported before any downstream invocation is attempted.
    pub fn is_missing_precondition(&self) -> bool {
        matches!(self, Self::MissingRootVar { .. })
    }
}
