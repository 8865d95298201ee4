use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// Minimum report length (separators and title included) before short mode trims it.
const SHORT_REPORT_MIN_LINES: usize = 7;
const SEPARATOR_MAX_WIDTH: usize = 79;

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    if status.as_u16() == 401 {
        warn!(method = %method, path = %path, "authentication failure");
    }

    response
}

/// How internal call failures are written to the server log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReporting {
    pub verbose: bool,
    pub short_errors: bool,
}

impl Default for FailureReporting {
    fn default() -> Self {
        Self {
            verbose: true,
            short_errors: true,
        }
    }
}

/// Renders the log report for a call that failed with an internal error.
///
/// `params` is omitted from the title when empty. In short mode a report of at
/// least seven lines keeps only its first four and last three lines.
pub fn failure_report(method: &str, params: Option<&str>, trace: &[String], short: bool) -> String {
    let mut title = format!("ERROR IN {method}");
    if let Some(params) = params {
        title = format!("{title} - (PARAMS: {params})");
    }
    let separator = "-".repeat(title.chars().count().min(SEPARATOR_MAX_WIDTH));

    let mut lines = vec![separator.clone(), title, separator];
    lines.extend(trace.iter().cloned());

    if short && lines.len() >= SHORT_REPORT_MIN_LINES {
        let tail = lines.split_off(lines.len() - 3);
        lines.truncate(4);
        lines.extend(tail);
    }
    lines.join("\n")
}
