use std::error::Error as StdError;

use thiserror::Error;

use crate::config::ConfigError;

/// Server-side failures outside of a dispatched call.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid method path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("method '{0}' is already registered")]
    DuplicateMethod(String),
    #[error("path '{0}' conflicts with a registered method")]
    PathConflict(String),
    #[error("namespace '{0}' does not exist")]
    UnknownNamespace(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn invalid_path(path: &str, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Failure returned by a registered callable.
#[derive(Debug, Error)]
pub enum MethodError {
    /// The callable rejected one of its argument values.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Failed(Box<dyn StdError + Send + Sync>),
}

impl MethodError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }

    /// The error followed by its chain of sources, one line each.
    pub fn trace_lines(&self) -> Vec<String> {
        let mut lines = vec![self.to_string()];
        let mut source = match self {
            Self::Failed(err) => err.source(),
            Self::InvalidParams(_) => None,
        };
        while let Some(err) = source {
            lines.push(format!("caused by: {err}"));
            source = err.source();
        }
        lines
    }
}

pub type MethodResult = Result<serde_json::Value, MethodError>;
