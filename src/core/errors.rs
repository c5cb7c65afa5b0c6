//! Error types for the warden-rs library.
//!
//! The taxonomy mirrors the pipeline's propagation policy: configuration
//! errors are fatal before phase 0, discovery and frame-load problems are
//! advisory-only, frame execution failures are captured into `error`
//! results, and only cancellation and timeout cross phase boundaries.

use std::io;

use thiserror::Error;

/// Main result type for warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

/// Comprehensive error type for all warden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Invalid or missing mandatory configuration. The only error the
    /// public pipeline surface raises before producing a result.
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// A frame discovery source could not be enumerated.
    #[error("Discovery error in source '{source_name}': {message}")]
    Discovery {
        /// Discovery source that failed
        source_name: String,
        /// Error description
        message: String,
    },

    /// A candidate frame failed validation during registry load.
    #[error("Frame '{frame_id}' failed to load: {message}")]
    FrameLoad {
        /// Candidate frame identifier (best effort)
        frame_id: String,
        /// Error description
        message: String,
    },

    /// A frame raised during execution. Captured by the runner and
    /// converted into a `FrameResult` with error status.
    #[error("Frame '{frame_id}' execution failed: {message}")]
    FrameExecution {
        /// Frame identifier
        frame_id: String,
        /// Error description
        message: String,
    },

    /// A frame exceeded its per-invocation deadline.
    #[error("Frame '{frame_id}' timed out after {timeout_ms} ms")]
    FrameTimeout {
        /// Frame identifier
        frame_id: String,
        /// Configured deadline in milliseconds
        timeout_ms: u64,
    },

    /// An optional collaborator capability is missing.
    #[error("Capability '{capability}' unavailable: {reason}")]
    CapabilityUnavailable {
        /// Capability name (llm, vcs, ast, baseline, ...)
        capability: String,
        /// Reason why it is unavailable
        reason: String,
    },

    /// Cooperative cancellation fired. Terminal at the pipeline level.
    #[error("Cancelled during '{stage}'")]
    Cancelled {
        /// Stage or operation that observed the cancellation
        stage: String,
    },

    /// The pipeline wall-clock budget expired. Terminal at the pipeline level.
    #[error("Timed out during '{stage}' after {budget_ms} ms")]
    Timeout {
        /// Stage or operation that hit the deadline
        stage: String,
        /// Budget in milliseconds
        budget_ms: u64,
    },

    /// I/O related errors (file operations, repository access, etc.)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Data format being processed
        format: Option<String>,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors for input data
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// VCS query errors (diff computation, ref resolution)
    #[error("VCS error: {message}")]
    Vcs {
        /// Error description
        message: String,
    },

    /// LLM provider interaction errors
    #[error("LLM error: {message}")]
    Llm {
        /// Error description
        message: String,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
        /// Additional context
        context: Option<String>,
    },
}

impl WardenError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new discovery error
    pub fn discovery(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a new frame load error
    pub fn frame_load(frame_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FrameLoad {
            frame_id: frame_id.into(),
            message: message.into(),
        }
    }

    /// Create a new frame execution error
    pub fn frame_execution(frame_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FrameExecution {
            frame_id: frame_id.into(),
            message: message.into(),
        }
    }

    /// Create a new frame timeout error
    pub fn frame_timeout(frame_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::FrameTimeout {
            frame_id: frame_id.into(),
            timeout_ms,
        }
    }

    /// Create a new capability unavailable error
    pub fn capability_unavailable(
        capability: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CapabilityUnavailable {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Create a new cancellation error
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled {
            stage: stage.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(stage: impl Into<String>, budget_ms: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            budget_ms,
        }
    }

    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new validation error with field context
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new VCS error
    pub fn vcs(message: impl Into<String>) -> Self {
        Self::Vcs {
            message: message.into(),
        }
    }

    /// Create a new LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an existing error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        if let Self::Internal { context: ctx, .. } = &mut self {
            *ctx = Some(context.into());
        }
        self
    }

    /// True when the error terminates the pipeline rather than a single
    /// frame: cancellation and timeout are the only two.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Timeout { .. })
    }

    /// True when the error is recorded as an advisory and never aborts
    /// the surrounding operation.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. } | Self::FrameLoad { .. } | Self::CapabilityUnavailable { .. }
        )
    }
}

impl From<io::Error> for WardenError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            format: Some("JSON".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for WardenError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML deserialization failed: {err}"),
            format: Some("YAML".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<git2::Error> for WardenError {
    fn from(err: git2::Error) -> Self {
        Self::vcs(format!("git operation failed: {err}"))
    }
}

/// Result extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error result
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WardenError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }

    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| e.into().with_context(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = WardenError::config("missing pipeline budget");
        assert!(matches!(err, WardenError::Config { .. }));

        let err = WardenError::frame_timeout("security_patterns", 30_000);
        assert_eq!(
            err.to_string(),
            "Frame 'security_patterns' timed out after 30000 ms"
        );
    }

    #[test]
    fn test_terminal_classification() {
        assert!(WardenError::cancelled("validation").is_terminal());
        assert!(WardenError::timeout("pipeline", 300_000).is_terminal());
        assert!(!WardenError::frame_execution("q", "boom").is_terminal());
    }

    #[test]
    fn test_advisory_classification() {
        assert!(WardenError::discovery("env_dirs", "unreadable").is_advisory());
        assert!(WardenError::capability_unavailable("llm", "not configured").is_advisory());
        assert!(!WardenError::config("bad").is_advisory());
    }

    #[test]
    fn test_result_extension() {
        let result: std::result::Result<i32, io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));

        let warden_result = result.context("reading frame manifest");
        assert!(warden_result.is_err());
    }
}
