//! Fixed fault table shared by both wire protocols

use std::fmt;

use serde::Serialize;

/// Symbolic fault kinds and their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Shares -32602 with `InvalidParams`; clients cannot tell the two apart by code.
    NotAuthorized,
    ServiceTimeout,
}

impl FaultKind {
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::NotAuthorized => -32602,
            Self::ServiceTimeout => -32090,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
            Self::NotAuthorized => "not_authorized",
            Self::ServiceTimeout => "service_timeout",
        }
    }

    /// "method_not_found" becomes "Method Not Found".
    pub fn default_message(self) -> String {
        self.key()
            .split('_')
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub code: i64,
    pub message: String,
    #[serde(skip)]
    pub kind: FaultKind,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Self {
            code: kind.code(),
            message: kind.default_message(),
            kind,
        }
    }

    pub fn with_message(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code(),
            message: message.into(),
            kind,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(FaultKind::ParseError)
    }

    pub fn invalid_request() -> Self {
        Self::new(FaultKind::InvalidRequest)
    }

    pub fn method_not_found() -> Self {
        Self::new(FaultKind::MethodNotFound)
    }

    pub fn invalid_params() -> Self {
        Self::new(FaultKind::InvalidParams)
    }

    pub fn internal_error() -> Self {
        Self::new(FaultKind::InternalError)
    }

    pub fn not_authorized() -> Self {
        Self::new(FaultKind::NotAuthorized)
    }

    pub fn service_timeout() -> Self {
        Self::new(FaultKind::ServiceTimeout)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
