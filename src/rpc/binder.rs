//! Binds wire parameters against a declared method signature
//!
//! Binding is strictly positional or keyword, never mixed. Declared defaults fill
//! unbound parameters, and declared types are checked as a separate pass once
//! every parameter has a value.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::errors::MethodError;
use crate::rpc::request::Params;

/// Runtime type a bound value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    /// Only values that arrived as floating point numbers.
    Float,
    /// Any JSON number.
    Number,
    Boolean,
    String,
    Array,
    Object,
}

impl ParamType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_f64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
    pub kind: Option<ParamType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    /// Accepts positional values beyond the declared parameters.
    pub variadic: bool,
    /// Accepts keywords that match no declared parameter.
    pub var_keywords: bool,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(self, name: &str) -> Self {
        self.push(name, None, None)
    }

    pub fn typed(self, name: &str, kind: ParamType) -> Self {
        self.push(name, None, Some(kind))
    }

    pub fn optional(self, name: &str, default: Value) -> Self {
        self.push(name, Some(default), None)
    }

    pub fn typed_optional(self, name: &str, kind: ParamType, default: Value) -> Self {
        self.push(name, Some(default), Some(kind))
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn var_keywords(mut self) -> Self {
        self.var_keywords = true;
        self
    }

    fn push(mut self, name: &str, default: Option<Value>, kind: Option<ParamType>) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default,
            kind,
        });
        self
    }

    fn declares(&self, name: &str) -> bool {
        self.params.iter().any(|param| param.name == name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("params must be an array or an object")]
    MalformedParams,
    #[error("keyword argument '{0}' not valid")]
    UnknownKeyword(String),
    #[error("too many positional arguments")]
    TooManyPositional,
    #[error("missing argument '{0}'")]
    MissingArgument(String),
    #[error("argument '{name}' must be of type {expected:?}")]
    TypeMismatch { name: String, expected: ParamType },
}

/// Keyword mapping plus leftover positional values, before type validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    pub named: Map<String, Value>,
    pub extra: Vec<Value>,
}

pub fn bind(signature: &Signature, params: &Params) -> Result<Binding, BindError> {
    let mut binding = Binding::default();

    match params {
        Params::Named(map) => {
            for (key, value) in map {
                if !signature.declares(key) && !signature.var_keywords {
                    return Err(BindError::UnknownKeyword(key.clone()));
                }
                binding.named.insert(key.clone(), value.clone());
            }
        }
        Params::Positional(values) => {
            for (index, value) in values.iter().enumerate() {
                match signature.params.get(index) {
                    Some(param) => {
                        binding.named.insert(param.name.clone(), value.clone());
                    }
                    None if signature.variadic => binding.extra.push(value.clone()),
                    None => return Err(BindError::TooManyPositional),
                }
            }
        }
        Params::Malformed(_) => return Err(BindError::MalformedParams),
    }

    for param in &signature.params {
        if binding.named.contains_key(&param.name) {
            continue;
        }
        match &param.default {
            Some(default) => {
                binding.named.insert(param.name.clone(), default.clone());
            }
            None => return Err(BindError::MissingArgument(param.name.clone())),
        }
    }

    Ok(binding)
}

/// Checks every bound value against its declared type, if one was declared.
pub fn validate_types(signature: &Signature, binding: &Binding) -> Result<(), BindError> {
    for param in &signature.params {
        let (Some(kind), Some(value)) = (param.kind, binding.named.get(&param.name)) else {
            continue;
        };
        if !kind.matches(value) {
            return Err(BindError::TypeMismatch {
                name: param.name.clone(),
                expected: kind,
            });
        }
    }
    Ok(())
}

/// Delivers the result of a method registered for out-of-band results.
#[derive(Debug)]
pub struct Responder {
    sender: oneshot::Sender<Value>,
}

impl Responder {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn send(self, value: Value) {
        // The dispatcher may have stopped waiting after a timeout.
        let _ = self.sender.send(value);
    }
}

/// Arguments handed to a registered callable.
#[derive(Debug, Default)]
pub struct BoundArgs {
    named: Map<String, Value>,
    extra: Vec<Value>,
    responder: Option<Responder>,
}

impl BoundArgs {
    pub fn new(binding: Binding) -> Self {
        Self {
            named: binding.named,
            extra: binding.extra,
            responder: None,
        }
    }

    pub(crate) fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Deserializes a bound argument; failures surface as InvalidParams.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<T, MethodError> {
        let value = self
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| MethodError::invalid_params(format!("missing argument '{name}'")))?;
        serde_json::from_value(value)
            .map_err(|err| MethodError::invalid_params(format!("argument '{name}': {err}")))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn extra(&self) -> &[Value] {
        &self.extra
    }

    pub fn take_responder(&mut self) -> Option<Responder> {
        self.responder.take()
    }
}
