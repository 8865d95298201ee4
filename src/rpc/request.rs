//! Decoded call requests and their outcomes

use serde_json::{Map, Value};

use crate::rpc::fault::Fault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// JSON-RPC request without a `"jsonrpc":"2.0"` marker.
    JsonRpc1,
    JsonRpc2,
    XmlRpc,
}

/// Call parameters as they arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
    /// Anything that is neither an array nor an object; rejected during binding.
    Malformed(Value),
}

impl Params {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Positional(items),
            Value::Object(map) => Self::Named(map),
            other => Self::Malformed(other),
        }
    }

    pub fn empty() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(items) => items.is_empty(),
            Self::Named(map) => map.is_empty(),
            Self::Malformed(_) => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Positional(items) => Value::Array(items.clone()),
            Self::Named(map) => Value::Object(map.clone()),
            Self::Malformed(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub method: String,
    pub params: Params,
    pub id: Option<Value>,
    pub is_notification: bool,
    pub version: ProtocolVersion,
}

impl CallRequest {
    pub fn new(method: impl Into<String>, params: Params, version: ProtocolVersion) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
            is_notification: false,
            version,
        }
    }
}

/// Result of one dispatched call.
pub type CallResult = Result<Value, Fault>;

/// Ordered requests from one transport message.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub requests: Vec<CallRequest>,
    pub is_batch: bool,
}
