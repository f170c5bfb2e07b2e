//! Standalone error types for nebula-chunk
//!
//! Pool operations never fail: a miss, a full free list or disabled pooling
//! all fall back to a fresh allocation. Errors only surface from the data
//! helpers callers use to fill chunks and from strict limit parsing.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::warn;

use crate::field_type::ElemWidth;

/// Chunk and column errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("Column index {index} out of range (chunk has {len} columns)")]
    ColumnIndexOutOfRange { index: usize, len: usize },

    #[error("Element width mismatch: column is {expected}, value is {actual}")]
    WidthMismatch {
        expected: ElemWidth,
        actual: ElemWidth,
    },

    #[error("Malformed column buffer: {reason}")]
    MalformedBuffer { reason: String },

    #[error("Invalid limit '{name}': {value}")]
    InvalidLimit { name: &'static str, value: String },
}

impl ChunkError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ColumnIndexOutOfRange { .. } => "CHUNK:COLUMN:INDEX",
            Self::WidthMismatch { .. } => "CHUNK:COLUMN:WIDTH",
            Self::MalformedBuffer { .. } => "CHUNK:COLUMN:BUFFER",
            Self::InvalidLimit { .. } => "CHUNK:CONFIG:LIMIT",
        }
    }

    /// Create column index out of range error
    pub fn column_index(index: usize, len: usize) -> Self {
        Self::ColumnIndexOutOfRange { index, len }
    }

    /// Create width mismatch error
    pub fn width_mismatch(expected: ElemWidth, actual: ElemWidth) -> Self {
        Self::WidthMismatch { expected, actual }
    }

    /// Create malformed buffer error
    pub fn malformed_buffer(reason: impl Into<String>) -> Self {
        Self::MalformedBuffer {
            reason: reason.into(),
        }
    }

    /// Create invalid limit error
    pub fn invalid_limit(name: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();

        #[cfg(feature = "logging")]
        warn!(limit = name, %value, "invalid chunk reuse limit");

        Self::InvalidLimit { name, value }
    }
}

/// Result type for chunk operations
pub type ChunkResult<T> = core::result::Result<T, ChunkError>;
