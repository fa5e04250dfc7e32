// src/error.rs

use std::time::Duration;

use thiserror::Error;

use crate::models::record::RecordId;

/// Errors raised by the duplicate detection and merge engine.
#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record {0} cannot be merged into itself")]
    SelfMergeRejected(RecordId),

    #[error("Target record {target} is itself a duplicate of {main}")]
    TargetIsDuplicate { target: RecordId, main: RecordId },

    #[error("Clustering pass exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("{failed} of {total} merge operations failed")]
    PartialBatchFailure { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DedupeError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DedupeError::Validation(msg.into())
    }
}
