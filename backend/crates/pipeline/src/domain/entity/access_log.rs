//! Access Log Entity
//!
//! Append-only record of guest visits and admin-area traffic. Written by the
//! logging policies, never read back by the pipeline.

use chrono::{DateTime, Utc};
use kernel::id::{AccessLogId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLogKind {
    /// Anonymous GET outside the admin area
    GuestVisit,
    /// Successful admin Basic-Auth check
    AdminLogin,
    /// Any request that passed the admin gate
    AdminVisit,
}

impl AccessLogKind {
    /// Value stored in the `type` column
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::GuestVisit => "guest_visit",
            Self::AdminLogin => "admin_login",
            Self::AdminVisit => "admin_visit",
        }
    }
}

impl fmt::Display for AccessLogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub id: AccessLogId,
    pub kind: AccessLogKind,
    /// Authenticated forum user, if any (guest visits never carry one)
    pub user_id: Option<UserId>,
    pub path: String,
    pub ip: String,
    pub created_at: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn new(
        kind: AccessLogKind,
        user_id: Option<UserId>,
        path: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            id: AccessLogId::new(),
            kind,
            user_id,
            path: path.into(),
            ip: ip.into(),
            created_at: Utc::now(),
        }
    }

    pub fn guest_visit(path: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::new(AccessLogKind::GuestVisit, None, path, ip)
    }
}
