//! Per-call dispatch: resolve, authenticate, bind, execute
//!
//! Calls from one message run strictly one after another. Every failure after
//! decoding becomes that call's fault and never aborts its siblings.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::{
    auth::Credentials,
    errors::MethodError,
    logging::{failure_report, FailureReporting},
    pool::{panic_message, PoolError, WorkerPools},
    rpc::{
        binder::{bind, validate_types, BoundArgs, Responder},
        fault::{Fault, FaultKind},
        registry::{AuthCheck, Execution, MethodDescriptor, Registry},
        request::{CallRequest, CallResult, Params},
        resolver::{resolve, Resolution},
    },
};

/// XML-RPC entry point that runs an array of `{methodName, params}` records.
pub const MULTICALL_METHOD: &str = "system.multicall";

/// Per-message state shared by the calls of one request.
#[derive(Debug, Default)]
pub struct CallContext {
    pub credentials: Option<Credentials>,
    /// Set when a call failed its credential check; the transport answers 401.
    pub challenge_requested: bool,
}

impl CallContext {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            challenge_requested: false,
        }
    }
}

#[derive(Debug)]
enum Failure {
    Method(MethodError),
    Panicked(String),
    Pool(PoolError),
    UnexpectedReturn,
}

impl Failure {
    fn trace(&self) -> Vec<String> {
        match self {
            Self::Method(err) => err.trace_lines(),
            Self::Panicked(message) => vec![format!("panicked: {message}")],
            Self::Pool(err) => vec![err.to_string()],
            Self::UnexpectedReturn => {
                vec!["method registered for out-of-band results returned a value".to_string()]
            }
        }
    }
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    pools: WorkerPools,
    reporting: FailureReporting,
    multicall: bool,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, pools: WorkerPools, reporting: FailureReporting) -> Self {
        Self {
            registry,
            pools,
            reporting,
            multicall: false,
        }
    }

    /// Serve `system.multicall` ahead of the namespace tree.
    pub fn with_multicall(mut self) -> Self {
        self.multicall = true;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs every request in order, each to completion before the next starts.
    pub async fn run(&self, ctx: &mut CallContext, requests: &[CallRequest]) -> Vec<CallResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.dispatch(ctx, request).await);
        }
        results
    }

    pub async fn dispatch(&self, ctx: &mut CallContext, request: &CallRequest) -> CallResult {
        let result = if self.multicall && request.method == MULTICALL_METHOD {
            self.multicall(ctx, &request.params).await
        } else {
            self.dispatch_call(ctx, &request.method, &request.params).await
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(fault) => fault.kind.key(),
        };
        debug!(
            method = %request.method,
            notification = request.is_notification,
            outcome,
            "rpc call dispatched"
        );
        result
    }

    async fn dispatch_call(
        &self,
        ctx: &mut CallContext,
        method_name: &str,
        params: &Params,
    ) -> CallResult {
        let method = match resolve(self.registry.root(), method_name)? {
            Resolution::Method(method) => method,
            Resolution::Listing(names) => return Ok(json!(names)),
        };

        if let Some(check) = &method.auth {
            authenticate(ctx, check)?;
        }

        let binding = bind(&method.signature, params)
            .and_then(|binding| validate_types(&method.signature, &binding).map(|()| binding))
            .map_err(|err| {
                debug!(method = %method_name, error = %err, "argument binding failed");
                Fault::invalid_params()
            })?;

        self.execute(&method, method_name, params, BoundArgs::new(binding)).await
    }

    async fn execute(
        &self,
        method: &MethodDescriptor,
        method_name: &str,
        params: &Params,
        mut args: BoundArgs,
    ) -> CallResult {
        let receiver = if method.async_result {
            let (responder, receiver) = Responder::channel();
            args = args.with_responder(responder);
            Some(receiver)
        } else {
            None
        };

        let run = self.complete(method, args, receiver);

        let outcome = match method.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(
                        method = %method_name,
                        timeout_ms = limit.as_millis(),
                        "rpc call timed out"
                    );
                    return Err(Fault::service_timeout());
                }
            },
            None => run.await,
        };

        outcome.map_err(|failure| self.fault_for(method_name, params, failure))
    }

    async fn complete(
        &self,
        method: &MethodDescriptor,
        args: BoundArgs,
        receiver: Option<oneshot::Receiver<Value>>,
    ) -> Result<Value, Failure> {
        let value = self.invoke(method, args).await?;
        match receiver {
            None => Ok(value),
            Some(_) if !value.is_null() => Err(Failure::UnexpectedReturn),
            // A dropped responder completes the call with null.
            Some(receiver) => Ok(receiver.await.unwrap_or(Value::Null)),
        }
    }

    async fn invoke(&self, method: &MethodDescriptor, args: BoundArgs) -> Result<Value, Failure> {
        let result = match &method.execution {
            Execution::Inline(func) => {
                let func = Arc::clone(func);
                AssertUnwindSafe(async move { func(args).await })
                    .catch_unwind()
                    .await
                    .map_err(|payload| Failure::Panicked(panic_message(payload)))?
            }
            Execution::Blocking { pool, func } => {
                let func = Arc::clone(func);
                self.pools
                    .get(*pool)
                    .submit(Box::new(move || func(args)))
                    .await
                    .map_err(Failure::Pool)?
            }
        };
        result.map_err(Failure::Method)
    }

    fn fault_for(&self, method_name: &str, params: &Params, failure: Failure) -> Fault {
        if let Failure::Method(MethodError::InvalidParams(message)) = &failure {
            debug!(method = %method_name, error = %message, "method rejected its arguments");
            return Fault::invalid_params();
        }

        if self.reporting.verbose {
            let params = (!params.is_empty()).then(|| params.to_value().to_string());
            let report = failure_report(
                method_name,
                params.as_deref(),
                &failure.trace(),
                self.reporting.short_errors,
            );
            error!(method = %method_name, "rpc call failed\n{report}");
        }
        Fault::internal_error()
    }

    async fn multicall(&self, ctx: &mut CallContext, params: &Params) -> CallResult {
        let calls = match params {
            Params::Positional(values) if values.len() == 1 => match &values[0] {
                Value::Array(calls) => calls,
                _ => return Err(Fault::invalid_params()),
            },
            _ => return Err(Fault::invalid_params()),
        };

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match multicall_entry(call) {
                Ok((MULTICALL_METHOD, _)) => Err(Fault::with_message(
                    FaultKind::InvalidRequest,
                    "Recursive system.multicall forbidden",
                )),
                Ok((method_name, params)) => self.dispatch_call(ctx, method_name, &params).await,
                Err(fault) => Err(fault),
            };
            results.push(match result {
                Ok(value) => json!([value]),
                Err(fault) => json!({"faultCode": fault.code, "faultString": fault.message}),
            });
        }
        Ok(Value::Array(results))
    }
}

fn authenticate(ctx: &mut CallContext, check: &AuthCheck) -> Result<(), Fault> {
    let accepted = ctx
        .credentials
        .as_ref()
        .is_some_and(|credentials| check(&credentials.username, &credentials.password));
    if accepted {
        return Ok(());
    }
    ctx.challenge_requested = true;
    Err(Fault::not_authorized())
}

fn multicall_entry(call: &Value) -> Result<(&str, Params), Fault> {
    let method_name = call
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(Fault::invalid_params)?;
    let params = call
        .get("params")
        .cloned()
        .map(Params::from_value)
        .unwrap_or_else(Params::empty);
    Ok((method_name, params))
}
