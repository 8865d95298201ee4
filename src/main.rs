use std::time::Duration;

use asyncrpc::{
    build_app,
    config::Config,
    errors::{AppError, MethodError},
    logging,
    pool::{PoolKind, WorkerPools},
    rpc::{
        binder::{ParamType, Signature},
        registry::{MethodDescriptor, Registry},
        server::RpcServer,
    },
    AppState,
};
use serde_json::{json, Value};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let mut registry = Registry::for_service(&config.company, &config.service)?;
    register_methods(&mut registry)?;
    for name in registry.method_names() {
        info!(method = %name, "interface registered");
    }

    let pools = WorkerPools::bounded(config.threadpool_size, config.processpool_size);
    let server = RpcServer::new(
        registry,
        config.protocol,
        pools,
        config.failure_reporting(),
    );
    let app = build_app(AppState::new(server, config.auth_realm.clone()));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        protocol = %config.protocol,
        threadpool_size = config.threadpool_size,
        processpool_size = config.processpool_size,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn register_methods(registry: &mut Registry) -> Result<(), AppError> {
    registry.register(
        "echo",
        MethodDescriptor::inline(Signature::new().param("message"), |args| async move {
            Ok(args.value("message").cloned().unwrap_or(Value::Null))
        }),
    )?;

    registry.register(
        "math.add",
        MethodDescriptor::inline(
            Signature::new()
                .typed("a", ParamType::Number)
                .typed("b", ParamType::Number),
            |args| async move {
                let a: f64 = args.arg("a")?;
                let b: f64 = args.arg("b")?;
                Ok(json!(a + b))
            },
        ),
    )?;

    registry.register(
        "math.sum",
        MethodDescriptor::inline(Signature::new().variadic(), |args| async move {
            let mut total = 0.0;
            for value in args.extra() {
                total += value
                    .as_f64()
                    .ok_or_else(|| MethodError::invalid_params("sum accepts numbers only"))?;
            }
            Ok(json!(total))
        }),
    )?;

    registry.register(
        "math.fibonacci",
        MethodDescriptor::blocking(
            PoolKind::Cpu,
            Signature::new().typed("n", ParamType::Integer),
            |args| {
                let n: u32 = args.arg("n")?;
                if n > 90 {
                    return Err(MethodError::invalid_params("n must be at most 90"));
                }
                let (mut current, mut next) = (0_u64, 1_u64);
                for _ in 0..n {
                    (current, next) = (next, current + next);
                }
                Ok(json!(current))
            },
        )
        .timeout(Duration::from_secs(5)),
    )?;

    registry.register(
        "util.sleep",
        MethodDescriptor::blocking(
            PoolKind::Io,
            Signature::new().typed("seconds", ParamType::Number),
            |args| {
                let seconds: f64 = args.arg("seconds")?;
                let duration = Duration::try_from_secs_f64(seconds)
                    .map_err(|err| MethodError::invalid_params(err.to_string()))?;
                std::thread::sleep(duration);
                Ok(json!(seconds))
            },
        )
        .timeout(Duration::from_secs(10)),
    )?;

    registry.register(
        "util.deferred_echo",
        MethodDescriptor::inline(
            Signature::new()
                .param("message")
                .typed_optional("delay_ms", ParamType::Integer, json!(100)),
            |mut args| async move {
                let delay_ms: u64 = args.arg("delay_ms")?;
                let message = args.value("message").cloned().unwrap_or(Value::Null);
                if let Some(responder) = args.take_responder() {
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        responder.send(message);
                    });
                }
                Ok(Value::Null)
            },
        )
        .async_result()
        .timeout(Duration::from_secs(30)),
    )?;

    Ok(())
}
