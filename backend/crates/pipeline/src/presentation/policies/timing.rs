//! Timing Policy
//!
//! Measures wall-clock time and resident memory around the rest of the
//! chain. Slow requests are logged at `warn`; outside production the
//! measurements are also returned as debug headers.
//!
//! A panic escaping downstream is caught here, logged, and answered with a
//! 500. The downstream is never invoked a second time.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use kernel::error::app_error::AppError;
use tokio::time::Instant;

use crate::application::config::{AppEnvironment, TimingConfig};
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::RequestContext;

pub const X_EXECUTION_TIME: HeaderName = HeaderName::from_static("x-execution-time");
pub const X_MEMORY_USAGE: HeaderName = HeaderName::from_static("x-memory-usage");

pub struct TimingPolicy {
    environment: AppEnvironment,
    slow_threshold: Duration,
}

impl TimingPolicy {
    pub fn new(environment: AppEnvironment, config: &TimingConfig) -> Self {
        Self {
            environment,
            slow_threshold: config.slow_threshold,
        }
    }
}

#[async_trait]
impl Policy for TimingPolicy {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Response {
        let context = RequestContext::of(&request);
        let url = request.uri().to_string();
        let method = request.method().clone();

        let started = Instant::now();
        let memory_before = resident_memory_bytes();

        let mut response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                tracing::error!(
                    error_message = %panic_message(payload.as_ref()),
                    url = %url,
                    method = %method,
                    "Request handler panicked"
                );
                AppError::internal("The server failed to process the request").into_response()
            }
        };

        let elapsed = started.elapsed();
        let execution_time_ms = elapsed.as_millis() as u64;
        let memory_delta = match (memory_before, resident_memory_bytes()) {
            (Some(before), Some(after)) => after as i64 - before as i64,
            _ => 0,
        };

        if elapsed > self.slow_threshold {
            tracing::warn!(
                url = %url,
                method = %method,
                execution_time_ms,
                memory_usage_bytes = memory_delta,
                user_agent = context.user_agent.as_deref().unwrap_or(""),
                ip = %context.client_ip,
                "Slow request detected"
            );
        }

        if !self.environment.is_production() {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&format!("{}ms", execution_time_ms)) {
                headers.insert(X_EXECUTION_TIME, value);
            }
            if let Ok(value) = HeaderValue::from_str(&format_megabytes(memory_delta)) {
                headers.insert(X_MEMORY_USAGE, value);
            }
        }

        response
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `VmRSS` of this process. `None` where `/proc` is unavailable.
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

fn format_megabytes(bytes: i64) -> String {
    format!("{:.2}MB", bytes as f64 / (1024.0 * 1024.0))
}
