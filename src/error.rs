// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the troupe runtime.
//!
//! This module provides strongly-typed errors for different parts of the runtime,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.
//!
//! Only two categories are ever surfaced to the outer caller as turn failures:
//! model invocation errors ([`ModelError`]) and resume-shape mismatches
//! ([`AgentError::ResumeShapeMismatch`]). Everything else degrades into
//! conversation content and the turn continues.

use thiserror::Error;

/// Errors that can occur while invoking the model capability.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Context window exceeded: {used} tokens used, {limit} available")]
    ContextWindowExceeded { used: u32, limit: u32 },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Streaming error: {0}")]
    StreamError(String),

    #[error("Model client not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ModelError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is retryable. Retry policy belongs to the model
    /// client, not the state machine; the flag is informational here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors that can occur during tool execution.
///
/// The registry folds these into tool output so the model can react;
/// they never abort the state machine.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Denied: {0}")]
    Denied(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    /// Check if this error should be reported back to the model.
    pub fn is_reportable(&self) -> bool {
        // All tool errors are reported so the model can try alternatives
        true
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::Denied(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Errors that can occur against the checkpoint store.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Thread not found: {0}")]
    NotFound(String),

    #[error("Failed to write checkpoint: {0}")]
    WriteFailed(String),

    #[error("Failed to read checkpoint: {0}")]
    ReadFailed(String),

    #[error("Checkpoint corrupted: {0}")]
    Corrupted(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CheckpointError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupted(err.to_string())
    }
}

/// Errors that can occur while driving an agent state machine.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Resume payload does not match suspension point: expected {expected}, got {got}")]
    ResumeShapeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Agent is not suspended: {0}")]
    NotSuspended(String),

    #[error("Maximum iterations exceeded: {0}")]
    MaxIterationsExceeded(u32),

    #[error("Maximum consecutive errors exceeded: {0}")]
    MaxErrorsExceeded(u32),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AgentError {
    /// Check if this error must surface to the outer caller as a turn
    /// failure. Everything else folds into conversation content.
    pub fn is_surfaced(&self) -> bool {
        matches!(
            self,
            Self::Model(_) | Self::ResumeShapeMismatch { .. } | Self::NotSuspended(_)
        )
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

/// Convert any error type that implements std::error::Error to an anyhow::Error.
pub fn to_anyhow<E: std::error::Error + Send + Sync + 'static>(err: E) -> anyhow::Error {
    anyhow::Error::new(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_retryable() {
        assert!(ModelError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ModelError::NetworkError("timeout".to_string()).is_retryable());
        assert!(ModelError::Timeout(30000).is_retryable());
        assert!(!ModelError::AuthError("invalid key".to_string()).is_retryable());
        assert!(!ModelError::ModelNotFound("gpt-5".to_string()).is_retryable());
    }

    #[test]
    fn test_model_error_api() {
        let err = ModelError::api("Bad request", 400);
        match err {
            ModelError::ApiError {
                message,
                status_code,
            } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_tool_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no access");
        let tool_err: ToolError = io_err.into();
        assert!(matches!(tool_err, ToolError::Denied(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{broken");
        let cfg_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(cfg_err, ConfigError::InvalidFormat(_)));
    }

    #[test]
    fn test_checkpoint_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("not valid json");
        let json_err = result.unwrap_err();
        let ckpt_err: CheckpointError = json_err.into();
        assert!(matches!(ckpt_err, CheckpointError::Corrupted(_)));
    }

    #[test]
    fn test_agent_error_from_model() {
        let model_err = ModelError::AuthError("invalid".to_string());
        let agent_err: AgentError = model_err.into();
        assert!(matches!(agent_err, AgentError::Model(_)));
    }

    #[test]
    fn test_agent_error_surfacing() {
        let mismatch = AgentError::ResumeShapeMismatch {
            expected: "continue",
            got: "delegateReply",
        };
        assert!(mismatch.is_surfaced());
        assert!(
            AgentError::Model(ModelError::Timeout(1000)).is_surfaced(),
            "model failures propagate to the caller"
        );
        assert!(!AgentError::Tool(ToolError::NotFound("x".to_string())).is_surfaced());
        assert!(!AgentError::Cancelled.is_surfaced());
    }

    #[test]
    fn test_error_display() {
        let err = AgentError::ResumeShapeMismatch {
            expected: "feedback",
            got: "continue",
        };
        let display = format!("{}", err);
        assert!(display.contains("feedback"));
        assert!(display.contains("continue"));
    }
}
