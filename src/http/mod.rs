//! HTTP transport for the RPC server
//!
//! Carries RPC messages on `POST /` and exposes health and discovery metadata.

pub mod handlers;
