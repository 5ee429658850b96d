//! Error types for service lifecycle operations

use thiserror::Error;

use crate::template::TemplateError;

/// Errors surfaced by the service manager and its drivers
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The native tool the detected backend relies on is missing
    #[error("required tool `{tool}` is not available on this host")]
    ToolUnavailable { tool: String },

    /// No usable descriptor could be produced or written
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// start/stop/restart on a service that has no installed artifact
    #[error("cannot toggle `{service}`: {reason}")]
    ToggleFailed { service: String, reason: String },

    /// A listing line did not match any known identity shape
    #[error("unrecognized service listing line: {0}")]
    ParseFailed(String),

    /// A native tool did not finish within the per-call timeout
    #[error("`{tool}` timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// The result-determining tool invocation exited non-zero
    #[error("`{tool}` exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("invalid service name `{0}`: use letters, digits, '.', '_' or '-'")]
    InvalidServiceName(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub(crate) fn toggle(service: &str, reason: impl Into<String>) -> Self {
        ServiceError::ToggleFailed {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_installed(service: &str) -> Self {
        Self::toggle(service, "service is not installed")
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
