//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use kernel::id::{AdminId, UserId};
use platform::password::HashedPassword;
use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    access_log::AccessLogEntry, admin_account::AdminAccount, principal::Principal,
};
use crate::domain::repository::{
    AccessLogRepository, AdminAccountRepository, PenaltyRepository, PrincipalRepository,
    SessionStore,
};
use crate::error::{StorageError, StorageResult};

const OLD_WINDOW_MS: i64 = 3600_000; // 1 hour

/// PostgreSQL-backed store for every pipeline port
#[derive(Clone)]
pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop rate-limit windows that can no longer affect a decision
    pub async fn cleanup_rate_limits(&self) -> StorageResult<u64> {
        let cutoff = Utc::now().timestamp_millis() - OLD_WINDOW_MS;

        let deleted = sqlx::query("DELETE FROM rate_limits WHERE window_start_ms < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(rate_limits = deleted, "Cleaned up stale rate limit windows");
        Ok(deleted)
    }
}

impl AccessLogRepository for PgPipelineStore {
    async fn record(&self, entry: &AccessLogEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_logs (
                access_log_id,
                "type",
                user_id,
                path,
                ip,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id.into_uuid())
        .bind(entry.kind.code())
        .bind(entry.user_id.map(UserId::into_uuid))
        .bind(&entry.path)
        .bind(&entry.ip)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(kind = %entry.kind, path = %entry.path, "Access log recorded");
        Ok(())
    }
}

impl AdminAccountRepository for PgPipelineStore {
    async fn find_by_login(&self, login: &str) -> StorageResult<Option<AdminAccount>> {
        let row = sqlx::query_as::<_, AdminRow>(
            r#"
            SELECT admin_id, username, email, password_hash
            FROM admins
            WHERE username = $1 OR email = $1
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AdminRow::into_admin_account).transpose()
    }
}

impl PrincipalRepository for PgPipelineStore {
    async fn find_by_id(&self, user_id: UserId) -> StorageResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT user_id, name, frozen_until, is_permanently_banned
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PrincipalRow::into_principal))
    }

    async fn clear_frozen_until(&self, user_id: UserId) -> StorageResult<()> {
        // Only clear a freeze that has actually run out; a concurrent
        // re-freeze must survive.
        sqlx::query(
            r#"
            UPDATE users
            SET frozen_until = NULL, updated_at = NOW()
            WHERE user_id = $1 AND frozen_until <= NOW()
            "#,
        )
        .bind(user_id.into_uuid())
        .execute(&self.pool)
        .await?;

        tracing::debug!(user_id = %user_id, "Expired freeze cleared");
        Ok(())
    }
}

impl PenaltyRepository for PgPipelineStore {
    async fn reset_expired_out_counts(&self, before: DateTime<Utc>) -> StorageResult<u64> {
        let reset = sqlx::query(
            r#"
            UPDATE users
            SET out_count = 0, out_count_updated_at = NULL, updated_at = NOW()
            WHERE out_count > 0 AND out_count_updated_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(reset)
    }
}

impl SessionStore for PgPipelineStore {
    async fn user_id(&self, session_id: &str) -> StorageResult<Option<UserId>> {
        let user_id = sqlx::query_scalar::<_, Option<Uuid>>(
            "SELECT user_id FROM sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id.flatten().map(UserId::from_uuid))
    }

    async fn put(
        &self,
        session_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET payload = jsonb_set(payload, ARRAY[$2::TEXT], $3::JSONB, true),
                last_activity = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl RateLimitStore for PgPipelineStore {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = config.window_ms().max(1);
        let window_start = (now_ms / window_ms) * window_ms;

        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            INSERT INTO rate_limits (bucket_key, window_start_ms, request_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (bucket_key, window_start_ms)
            DO UPDATE SET request_count = rate_limits.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        let count = row.0.max(0) as u32;
        let allowed = count <= config.max_requests;

        if !allowed {
            tracing::warn!(key = %key, count = count, max = config.max_requests, "Rate limit exceeded");
        }

        Ok(RateLimitResult {
            allowed,
            remaining: config.max_requests.saturating_sub(count),
            reset_at_ms: window_start + window_ms,
        })
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct AdminRow {
    admin_id: Uuid,
    username: String,
    email: String,
    password_hash: String,
}

impl AdminRow {
    fn into_admin_account(self) -> StorageResult<AdminAccount> {
        let password_hash = HashedPassword::from_phc_string(self.password_hash).map_err(|e| {
            StorageError::Unavailable(format!("admin {} has an unusable password hash: {}", self.admin_id, e))
        })?;

        Ok(AdminAccount {
            id: AdminId::from_uuid(self.admin_id),
            username: self.username,
            email: self.email,
            password_hash,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    user_id: Uuid,
    name: String,
    frozen_until: Option<DateTime<Utc>>,
    is_permanently_banned: bool,
}

impl PrincipalRow {
    fn into_principal(self) -> Principal {
        Principal {
            id: UserId::from_uuid(self.user_id),
            name: self.name,
            frozen_until: self.frozen_until,
            is_permanently_banned: self.is_permanently_banned,
        }
    }
}
