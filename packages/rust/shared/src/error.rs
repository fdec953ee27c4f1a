//! Error types for the enhancement pipeline.
//!
//! Library crates use [`EnhancerError`] via `thiserror`; external-service
//! failures are reported as [`ProviderError`] so retry logic can tell transient
//! failures from permanent ones. The CLI wraps both with `color-eyre`.

use std::path::PathBuf;

use crate::types::{ModuleId, Stage};

/// Top-level error type for all enhancer operations.
#[derive(Debug, thiserror::Error)]
pub enum EnhancerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A module id was not found in storage.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// An external service call failed and could not be recovered.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A stage failed in a way that aborts the whole task.
    #[error("{stage} stage failed: {message}")]
    FatalStage { stage: Stage, message: String },

    /// Enqueue rejected: the module is already queued or running.
    #[error("module {0} is already queued or running")]
    DuplicateTask(ModuleId),

    /// The queue worker is no longer accepting work.
    #[error("enhancement queue is stopped")]
    QueueStopped,

    /// A worker is already attached to this queue.
    #[error("enhancement queue already has a running worker")]
    WorkerRunning,

    /// The running task was aborted by shutdown before it finished.
    #[error("task cancelled")]
    Cancelled,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, malformed record, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnhancerError>;

impl EnhancerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl std::fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Create a fatal stage error.
    pub fn fatal(stage: Stage, msg: impl Into<String>) -> Self {
        Self::FatalStage {
            stage,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short one-line summary suitable for the admin task list.
    pub fn summary(&self) -> String {
        let full = self.to_string();
        match full.char_indices().nth(160) {
            Some((idx, _)) => format!("{}…", &full[..idx]),
            None => full,
        }
    }
}

/// Failure modes of the external services (LLM, web search, encyclopedia, video search).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the call because of request rate.
    #[error("rate limited")]
    RateLimited,

    /// The provider's daily/project quota is used up.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The call did not complete within its time budget.
    #[error("timed out")]
    Timeout,

    /// The call succeeded but returned nothing usable.
    #[error("no results")]
    NoResults,

    /// The response could not be decoded or was empty.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Connection-level or 5xx failure.
    #[error("network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient failures are worth retrying within the same stage.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Network(_))
    }
}
