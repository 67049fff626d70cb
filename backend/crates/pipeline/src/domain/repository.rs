//! Repository Traits
//!
//! Ports the policies depend on. Implementations are in the infra layer
//! (`PgPipelineStore`, the log sinks) and in-memory fakes in tests.

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::entity::{
    access_log::AccessLogEntry,
    admin_account::AdminAccount,
    external_log::{AccessRecord, Anomaly},
    principal::Principal,
};
use crate::error::{SinkError, StorageResult};

/// Append-only access log
#[trait_variant::make(AccessLogRepository: Send)]
pub trait LocalAccessLogRepository {
    async fn record(&self, entry: &AccessLogEntry) -> StorageResult<()>;
}

#[trait_variant::make(AdminAccountRepository: Send)]
pub trait LocalAdminAccountRepository {
    /// Account whose username OR email equals `login`
    async fn find_by_login(&self, login: &str) -> StorageResult<Option<AdminAccount>>;
}

#[trait_variant::make(PrincipalRepository: Send)]
pub trait LocalPrincipalRepository {
    async fn find_by_id(&self, user_id: UserId) -> StorageResult<Option<Principal>>;

    /// Persist the lazy expiry of a temporary freeze
    async fn clear_frozen_until(&self, user_id: UserId) -> StorageResult<()>;
}

/// Report-based penalty counters
#[trait_variant::make(PenaltyRepository: Send)]
pub trait LocalPenaltyRepository {
    /// Reset out-counts last raised before `before`. Returns the number of
    /// accounts touched.
    async fn reset_expired_out_counts(&self, before: DateTime<Utc>) -> StorageResult<u64>;
}

/// Server-side session storage. Sessions are created by the login flow,
/// which is outside the pipeline; here they are only read and annotated.
#[trait_variant::make(SessionStore: Send)]
pub trait LocalSessionStore {
    async fn user_id(&self, session_id: &str) -> StorageResult<Option<UserId>>;

    /// Set `key` in the session payload. A missing session is not an error.
    async fn put(&self, session_id: &str, key: &str, value: serde_json::Value)
    -> StorageResult<()>;
}

/// Mirror of the access log kept outside the application
#[trait_variant::make(ExternalLogSink: Send)]
pub trait LocalExternalLogSink {
    async fn send_access(&self, record: &AccessRecord) -> Result<(), SinkError>;

    async fn raise_anomaly(&self, anomaly: &Anomaly) -> Result<(), SinkError>;
}
