//! External Log Policy
//!
//! Mirrors every completed request to an [`ExternalLogSink`] and raises an
//! anomaly for 5xx responses. Sink failures are logged and dropped; the
//! response is already computed by the time the sink is called.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header;
use axum::response::Response;
use chrono::Utc;
use tokio::time::Instant;

use crate::domain::entity::external_log::AccessRecord;
use crate::domain::repository::ExternalLogSink;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{CurrentPrincipal, RequestContext};

pub struct ExternalLogPolicy<K> {
    sink: Arc<K>,
    detached: bool,
}

impl<K> ExternalLogPolicy<K>
where
    K: ExternalLogSink + Send + Sync + 'static,
{
    pub fn new(sink: Arc<K>, detached: bool) -> Self {
        Self { sink, detached }
    }
}

#[async_trait]
impl<K> Policy for ExternalLogPolicy<K>
where
    K: ExternalLogSink + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "external_log"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Response {
        let context = RequestContext::of(&request);
        let user_id = CurrentPrincipal::of(&request).map(|principal| principal.id);
        let method = request.method().to_string();
        let url = full_url(&request);

        let started = Instant::now();
        let response = next.run(request).await;

        let record = AccessRecord {
            method,
            url,
            ip: context.client_ip,
            user_agent: context.user_agent,
            status: response.status().as_u16(),
            duration_ms: started.elapsed().as_millis() as u64,
            user_id,
            occurred_at: Utc::now(),
        };

        if self.detached {
            let sink = self.sink.clone();
            tokio::spawn(async move { mirror(sink.as_ref(), record).await });
        } else {
            mirror(self.sink.as_ref(), record).await;
        }

        response
    }
}

async fn mirror<K: ExternalLogSink>(sink: &K, record: AccessRecord) {
    if let Err(e) = sink.send_access(&record).await {
        tracing::warn!(error = %e, url = %record.url, "Failed to mirror access log");
    }

    if let Some(anomaly) = record.anomaly() {
        tracing::error!(
            status = anomaly.status,
            url = %anomaly.url,
            method = %anomaly.method,
            "Server error response"
        );
        if let Err(e) = sink.raise_anomaly(&anomaly).await {
            tracing::warn!(error = %e, url = %anomaly.url, "Failed to raise anomaly");
        }
    }
}

/// Absolute URL as the client requested it.
fn full_url(request: &Request) -> String {
    let uri = request.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }

    let headers = request.headers();
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()));
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            format!("{}://{}{}", scheme, host, path)
        }
        None => path.to_string(),
    }
}
