//! Wire codecs: raw request bytes to call requests, call results to response bytes
//!
//! The server picks one codec at construction time from the configured protocol.

pub mod json;
pub mod xml;

use std::{fmt, str::FromStr, sync::Arc};

use crate::rpc::{
    fault::Fault,
    request::{Batch, CallRequest, CallResult},
};

pub trait Codec: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn content_type(&self) -> &'static str;

    /// A decode failure aborts the whole message with a single fault.
    fn decode(&self, body: &[u8]) -> Result<Batch, Fault>;

    fn encode(&self, pairs: Vec<(CallRequest, CallResult)>, is_batch: bool) -> String;

    /// Response body for a fault that is not tied to any decoded request.
    fn encode_fault(&self, fault: &Fault) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    JsonRpc,
    XmlRpc,
}

impl Protocol {
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            Self::JsonRpc => Arc::new(json::JsonCodec),
            Self::XmlRpc => Arc::new(xml::XmlCodec),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonRpc => "json",
            Self::XmlRpc => "xml",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonrpc" | "json-rpc" => Ok(Self::JsonRpc),
            "xml" | "xmlrpc" | "xml-rpc" => Ok(Self::XmlRpc),
            _ => Err(()),
        }
    }
}
