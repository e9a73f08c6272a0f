//! Typed error hierarchy for the generation pipeline.
//!
//! A single `DalleError` enum covers every failure class the library can
//! surface. Database and metrics I/O problems are reported as `CacheIo`
//! and are expected to degrade (callers fall back to embedded or
//! in-memory state); everything else aborts the current generation run
//! and propagates unchanged.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DalleError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("archive entry `{name}` exceeds the {limit} byte decompression limit")]
    ArchiveTooLarge { name: String, limit: u64 },

    #[error("cache I/O failed while {operation}: {source}")]
    CacheIo {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("series I/O failed for {path}: {reason}")]
    SeriesIo { path: PathBuf, reason: String },

    #[error("provider returned HTTP {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("content policy violation ({code}): {message}")]
    PolicyViolation {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    #[error("annotation failed: {reason}")]
    AnnotateFailed { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DalleError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn cache_io(operation: &'static str, source: std::io::Error) -> Self {
        Self::CacheIo { operation, source }
    }

    pub fn series_io(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SeriesIo {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn annotate_failed(reason: impl Into<String>) -> Self {
        Self::AnnotateFailed {
            reason: reason.into(),
        }
    }

    /// Build the API error for a non-2xx provider response. Responses whose
    /// provider code marks a content policy violation get their own variant
    /// so callers can order retries around them; nothing branches on it by
    /// default.
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if code.contains("content_policy") {
            Self::PolicyViolation {
                status,
                code,
                message,
            }
        } else {
            Self::Api {
                status,
                code,
                message,
            }
        }
    }

    /// Whether this error degrades instead of aborting a run.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::CacheIo { .. })
    }
}

pub type Result<T> = std::result::Result<T, DalleError>;
