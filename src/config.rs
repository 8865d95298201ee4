use std::{env, net::SocketAddr};

use thiserror::Error;

use crate::{logging::FailureReporting, rpc::codec::Protocol};

#[derive(Debug, Clone)]
pub struct Config {
    pub company: String,
    pub service: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub protocol: Protocol,
    pub threadpool_size: usize,
    pub processpool_size: usize,
    pub verbose_errors: bool,
    pub short_errors: bool,
    pub auth_realm: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RPC_COMPANY is required and must not be empty")]
    MissingCompany,
    #[error("RPC_SERVICE is required and must not be empty")]
    MissingService,
    #[error("RPC_PORT must be a valid u16")]
    InvalidPort,
    #[error("{0} must be a positive integer")]
    InvalidPoolSize(&'static str),
    #[error("RPC_PROTOCOL must be `json` or `xml`, got `{0}`")]
    UnknownProtocol(String),
    #[error("{0} must be a boolean")]
    InvalidBoolean(&'static str),
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let company = value("RPC_COMPANY").ok_or(ConfigError::MissingCompany)?;
        let service = value("RPC_SERVICE").ok_or(ConfigError::MissingService)?;

        let bind_addr = value("RPC_BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string());
        let bind_port = value("RPC_PORT")
            .map(|port| port.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(10080);
        let protocol = value("RPC_PROTOCOL")
            .map(|name| {
                name.parse::<Protocol>()
                    .map_err(|_| ConfigError::UnknownProtocol(name))
            })
            .transpose()?
            .unwrap_or(Protocol::JsonRpc);

        let threadpool_size = pool_size("RPC_THREADPOOL_SIZE", value("RPC_THREADPOOL_SIZE"), 100)?;
        let processpool_size =
            pool_size("RPC_PROCESSPOOL_SIZE", value("RPC_PROCESSPOOL_SIZE"), 10)?;
        let verbose_errors = flag("RPC_VERBOSE_ERRORS", value("RPC_VERBOSE_ERRORS"), true)?;
        let short_errors = flag("RPC_SHORT_ERRORS", value("RPC_SHORT_ERRORS"), true)?;
        let auth_realm = value("RPC_AUTH_REALM").unwrap_or_else(|| "asyncrpc".to_string());

        let config = Self {
            company,
            service,
            bind_addr,
            bind_port,
            protocol,
            threadpool_size,
            processpool_size,
            verbose_errors,
            short_errors,
            auth_realm,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn failure_reporting(&self) -> FailureReporting {
        FailureReporting {
            verbose: self.verbose_errors,
            short_errors: self.short_errors,
        }
    }
}

fn pool_size(key: &'static str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ConfigError::InvalidPoolSize(key)),
    }
}

fn flag(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBoolean(key)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn parse(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("RPC_COMPANY", "acme"), ("RPC_SERVICE", "billing")];

    fn with_required(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        REQUIRED.iter().chain(extra).copied().collect()
    }

    #[test]
    fn parse_defaults() {
        let config = parse(&REQUIRED).expect("config should parse");
        assert_eq!(config.company, "acme");
        assert_eq!(config.service, "billing");
        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.bind_port, 10080);
        assert_eq!(config.protocol, Protocol::JsonRpc);
        assert_eq!(config.threadpool_size, 100);
        assert_eq!(config.processpool_size, 10);
        assert_eq!(config.failure_reporting(), FailureReporting::default());
        assert_eq!(config.auth_realm, "asyncrpc");
    }

    #[test]
    fn missing_namespace_fails() {
        let err = parse(&[("RPC_SERVICE", "billing")]).expect_err("expected missing company");
        assert!(matches!(err, ConfigError::MissingCompany));

        let err = parse(&[("RPC_COMPANY", "acme"), ("RPC_SERVICE", "  ")])
            .expect_err("expected missing service");
        assert!(matches!(err, ConfigError::MissingService));
    }

    #[test]
    fn overrides_parse() {
        let config = parse(&with_required(&[
            ("RPC_BIND_ADDR", "127.0.0.1"),
            ("RPC_PORT", "9000"),
            ("RPC_PROTOCOL", "xml"),
            ("RPC_THREADPOOL_SIZE", "8"),
            ("RPC_PROCESSPOOL_SIZE", "2"),
            ("RPC_VERBOSE_ERRORS", "false"),
            ("RPC_SHORT_ERRORS", "0"),
            ("RPC_AUTH_REALM", "billing"),
        ]))
        .expect("config should parse");

        assert_eq!(
            config.bind_socket().expect("socket"),
            "127.0.0.1:9000".parse().expect("valid socket")
        );
        assert_eq!(config.protocol, Protocol::XmlRpc);
        assert_eq!(config.threadpool_size, 8);
        assert_eq!(config.processpool_size, 2);
        assert!(!config.verbose_errors);
        assert!(!config.short_errors);
        assert_eq!(config.auth_realm, "billing");
    }

    #[test]
    fn invalid_values_fail() {
        let err = parse(&with_required(&[("RPC_PORT", "70000")])).expect_err("port");
        assert!(matches!(err, ConfigError::InvalidPort));

        let err = parse(&with_required(&[("RPC_PROTOCOL", "soap")])).expect_err("protocol");
        assert!(matches!(err, ConfigError::UnknownProtocol(name) if name == "soap"));

        let err = parse(&with_required(&[("RPC_THREADPOOL_SIZE", "0")])).expect_err("pool");
        assert!(matches!(err, ConfigError::InvalidPoolSize("RPC_THREADPOOL_SIZE")));

        let err = parse(&with_required(&[("RPC_SHORT_ERRORS", "maybe")])).expect_err("flag");
        assert!(matches!(err, ConfigError::InvalidBoolean("RPC_SHORT_ERRORS")));

        let err = parse(&with_required(&[("RPC_BIND_ADDR", "not an address")])).expect_err("socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }
}
