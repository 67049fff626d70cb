//! Records mirrored to the external log sink.

use chrono::{DateTime, Utc};
use kernel::id::UserId;
use serde::Serialize;

/// One completed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    pub method: String,
    pub url: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub status: u16,
    pub duration_ms: u64,
    pub user_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Raised for responses with status >= 500.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub status: u16,
    pub url: String,
    pub method: String,
    pub occurred_at: DateTime<Utc>,
}

impl AccessRecord {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn anomaly(&self) -> Option<Anomaly> {
        self.is_server_error().then(|| Anomaly {
            status: self.status,
            url: self.url.clone(),
            method: self.method.clone(),
            occurred_at: self.occurred_at,
        })
    }
}

