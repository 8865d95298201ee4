//! Transport-independent entry point for one RPC message

use std::sync::Arc;

use tracing::debug;

use crate::{
    auth::Credentials,
    logging::FailureReporting,
    pool::WorkerPools,
    rpc::{
        codec::{Codec, Protocol},
        dispatcher::{CallContext, Dispatcher},
        registry::Registry,
    },
};

/// Encoded reply plus what the transport needs to frame it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcReply {
    pub body: String,
    pub content_type: &'static str,
    /// A call failed its credential check; answer with an authentication challenge.
    pub challenge: bool,
}

pub struct RpcServer {
    dispatcher: Dispatcher,
    codec: Arc<dyn Codec>,
}

impl RpcServer {
    /// Takes ownership of the registry; nothing can be registered afterwards.
    pub fn new(
        registry: Registry,
        protocol: Protocol,
        pools: WorkerPools,
        reporting: FailureReporting,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::new(registry), pools, reporting);
        let dispatcher = match protocol {
            Protocol::XmlRpc => dispatcher.with_multicall(),
            Protocol::JsonRpc => dispatcher,
        };
        Self {
            dispatcher,
            codec: protocol.codec(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.codec.protocol()
    }

    pub fn content_type(&self) -> &'static str {
        self.codec.content_type()
    }

    pub fn method_names(&self) -> Vec<String> {
        self.dispatcher.registry().method_names()
    }

    pub async fn handle(&self, body: &[u8], credentials: Option<Credentials>) -> RpcReply {
        let batch = match self.codec.decode(body) {
            Ok(batch) => batch,
            Err(fault) => {
                debug!(fault = %fault, "rpc message rejected before dispatch");
                return self.reply(self.codec.encode_fault(&fault), false);
            }
        };

        let mut ctx = CallContext::new(credentials);
        let results = self.dispatcher.run(&mut ctx, &batch.requests).await;
        let pairs = batch.requests.into_iter().zip(results).collect();

        self.reply(
            self.codec.encode(pairs, batch.is_batch),
            ctx.challenge_requested,
        )
    }

    fn reply(&self, body: String, challenge: bool) -> RpcReply {
        RpcReply {
            body,
            content_type: self.codec.content_type(),
            challenge,
        }
    }
}
