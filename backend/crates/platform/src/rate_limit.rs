//! Rate Limiting Infrastructure
//!
//! The named limiters the forum exposes, and the storage abstraction that
//! actually counts requests.

use std::time::Duration;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(10)
    }
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub const fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, 60)
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// What a limiter counts requests by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKey {
    /// Client IP only
    Ip,
    /// Authenticated user id, or the client IP for guests
    UserOrIp,
}

/// A limiter with a fixed name and quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedLimit {
    pub name: &'static str,
    pub config: RateLimitConfig,
    pub key: LimitKey,
}

impl NamedLimit {
    pub const API: NamedLimit = NamedLimit {
        name: "api",
        config: RateLimitConfig::per_minute(60),
        key: LimitKey::UserOrIp,
    };

    pub const LOGIN: NamedLimit = NamedLimit {
        name: "login",
        config: RateLimitConfig::per_minute(5),
        key: LimitKey::Ip,
    };

    pub const VERIFICATION: NamedLimit = NamedLimit {
        name: "verification",
        config: RateLimitConfig::per_minute(1),
        key: LimitKey::Ip,
    };

    pub const POST: NamedLimit = NamedLimit {
        name: "post",
        config: RateLimitConfig::per_minute(10),
        key: LimitKey::UserOrIp,
    };

    pub const ALL: [NamedLimit; 4] = [Self::API, Self::LOGIN, Self::VERIFICATION, Self::POST];

    pub fn by_name(name: &str) -> Option<NamedLimit> {
        Self::ALL.into_iter().find(|limit| limit.name == name)
    }

    /// Bucket key: `"{limiter}:{identity}"`.
    ///
    /// `user_id` is ignored for [`LimitKey::Ip`] limiters.
    pub fn bucket_key(&self, user_id: Option<&str>, ip: &str) -> String {
        let identity = match (self.key, user_id) {
            (LimitKey::UserOrIp, Some(user)) => user,
            _ => ip,
        };
        format!("{}:{}", self.name, identity)
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at_ms: i64,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, at least 1.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.reset_at_ms - now_ms).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    }
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Check and increment the counter for `key`
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>>;
}
