//! Axum HTTP handlers for the web server
//!
//! Provides the RPC endpoint and general metadata endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::{basic_credentials, challenge_header};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub protocol: &'static str,
    pub endpoint: &'static str,
    pub interfaces: Vec<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        protocol: state.server.protocol().as_str(),
        endpoint: "/",
        interfaces: state.server.method_names(),
    })
}

pub async fn rpc_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let reply = state
        .server
        .handle(&body, basic_credentials(&headers))
        .await;

    let content_type = [(
        header::CONTENT_TYPE,
        HeaderValue::from_static(reply.content_type),
    )];
    if reply.challenge {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge_header(&state.auth_realm))],
            content_type,
            reply.body,
        )
            .into_response();
    }

    (StatusCode::OK, content_type, reply.body).into_response()
}
