use axum::http::{HeaderMap, HeaderValue};
use axum_extra::headers::{
    authorization::{Authorization, Basic},
    HeaderMapExt,
};

/// Username and password decoded from a `Basic` authorization header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A missing header and a malformed one both yield `None`.
pub fn basic_credentials(headers: &HeaderMap) -> Option<Credentials> {
    headers
        .typed_get::<Authorization<Basic>>()
        .map(|auth| Credentials::new(auth.username(), auth.password()))
}

pub fn challenge_header(realm: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"))
}
