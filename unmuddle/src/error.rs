//! Error types for unmuddle
//!
//! Everything here is fatal for the run. Recoverable conditions (unknown
//! addresses, unmatched directories, failed tool calls) never become errors;
//! they are logged and take their documented fallback path.

use crate::page_index::PageIndexError;
use crate::services::tools::ToolError;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required part of the dump directory is missing
    #[error("Missing input {what}: {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    /// Time offset or config failure
    #[error(transparent)]
    Common(#[from] unmuddle_common::Error),

    /// Page list could not be indexed
    #[error(transparent)]
    PageIndex(#[from] PageIndexError),

    /// Required external tool is unavailable
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Output tree could not be written
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
