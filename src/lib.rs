use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod pool;
pub mod rpc;

use rpc::server::RpcServer;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<RpcServer>,
    pub auth_realm: Arc<str>,
}

impl AppState {
    pub fn new(server: RpcServer, auth_realm: String) -> Self {
        Self {
            server: Arc::new(server),
            auth_realm: Arc::<str>::from(auth_realm),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(http::handlers::rpc_endpoint))
        .route("/health", get(http::handlers::health))
        .route("/.well-known/rpc", get(http::handlers::discovery))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
