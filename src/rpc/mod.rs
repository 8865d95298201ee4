//! RPC core: codecs, namespace resolution, argument binding and dispatch
//!
//! Request bytes flow through `Codec::decode`, the `Dispatcher` runs each call in
//! order, and `Codec::encode` assembles the reply.

pub mod binder;
pub mod codec;
pub mod dispatcher;
pub mod fault;
pub mod registry;
pub mod request;
pub mod resolver;
pub mod server;
