//! External Log Sinks
//!
//! - [`HttpLogSink`]: JSON POST to `{endpoint}/access` and
//!   `{endpoint}/anomalies`
//! - [`TracingLogSink`]: structured events on the `external` target, for
//!   deployments that ship logs with an agent instead
//! - [`LogSink`]: whichever of the two the configuration selects

use std::time::Duration;

use crate::application::config::ExternalLogConfig;
use crate::domain::entity::external_log::{AccessRecord, Anomaly};
use crate::domain::repository::ExternalLogSink;
use crate::error::SinkError;

const SINK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogSink {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(SINK_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<(), SinkError> {
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

impl ExternalLogSink for HttpLogSink {
    async fn send_access(&self, record: &AccessRecord) -> Result<(), SinkError> {
        self.post("access", record).await
    }

    async fn raise_anomaly(&self, anomaly: &Anomaly) -> Result<(), SinkError> {
        self.post("anomalies", anomaly).await
    }
}

/// Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl ExternalLogSink for TracingLogSink {
    async fn send_access(&self, record: &AccessRecord) -> Result<(), SinkError> {
        let user_id = record.user_id.map(|id| id.to_string());
        tracing::info!(
            target: "external",
            method = %record.method,
            url = %record.url,
            ip = %record.ip,
            user_agent = record.user_agent.as_deref().unwrap_or(""),
            status = record.status,
            duration_ms = record.duration_ms,
            user_id = user_id.as_deref(),
            "access"
        );
        Ok(())
    }

    async fn raise_anomaly(&self, anomaly: &Anomaly) -> Result<(), SinkError> {
        tracing::error!(
            target: "external",
            status = anomaly.status,
            url = %anomaly.url,
            method = %anomaly.method,
            "Server error anomaly"
        );
        Ok(())
    }
}

/// Sink chosen at startup: HTTP when an endpoint is configured.
#[derive(Clone)]
pub enum LogSink {
    Http(HttpLogSink),
    Tracing(TracingLogSink),
}

impl LogSink {
    pub fn from_config(config: &ExternalLogConfig) -> Result<Self, SinkError> {
        match &config.endpoint {
            Some(endpoint) => Ok(Self::Http(HttpLogSink::new(endpoint.as_str())?)),
            None => Ok(Self::Tracing(TracingLogSink)),
        }
    }
}

impl ExternalLogSink for LogSink {
    async fn send_access(&self, record: &AccessRecord) -> Result<(), SinkError> {
        match self {
            Self::Http(sink) => sink.send_access(record).await,
            Self::Tracing(sink) => sink.send_access(record).await,
        }
    }

    async fn raise_anomaly(&self, anomaly: &Anomaly) -> Result<(), SinkError> {
        match self {
            Self::Http(sink) => sink.raise_anomaly(anomaly).await,
            Self::Tracing(sink) => sink.raise_anomaly(anomaly).await,
        }
    }
}
