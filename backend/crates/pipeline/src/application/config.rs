//! Application Configuration
//!
//! Built once at startup, shared by `Arc` into every policy. Nothing in the
//! pipeline reads the environment at request time.

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use axum::http::HeaderName;
use axum::http::header::{CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY_REPORT_ONLY};
use chrono::{DateTime, Utc};
use platform::rate_limit::NamedLimit;

use crate::domain::value_object::{csp::CspPolicy, route::PathPrefix};
use crate::error::ConfigError;

/// Deployment environment (`APP_ENV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnvironment {
    #[default]
    Production,
    Staging,
    Local,
    Testing,
}

impl AppEnvironment {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Local => "local",
            Self::Testing => "testing",
        }
    }

    #[inline]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "local" | "development" | "dev" => Some(Self::Local),
            "testing" | "test" => Some(Self::Testing),
            _ => None,
        }
    }
}

/// Admin gate configuration
#[derive(Debug, Clone)]
pub struct AdminGateConfig {
    /// Secret path prefix the admin subtree is mounted under
    pub path_prefix: PathPrefix,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
}

impl AdminGateConfig {
    /// Random 32-char hex prefix. Operators are expected to override it.
    pub fn with_random_prefix() -> Self {
        Self {
            path_prefix: PathPrefix::new(platform::crypto::random_hex(16)),
            password_pepper: None,
        }
    }

    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct CspConfig {
    pub enabled: bool,
    /// Send `Content-Security-Policy-Report-Only` instead
    pub report_only: bool,
    pub policy: CspPolicy,
    /// Requests under this prefix skip nonce generation and every header
    pub diagnostics_prefix: PathPrefix,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_only: false,
            policy: CspPolicy::default(),
            diagnostics_prefix: PathPrefix::new("telescope"),
        }
    }
}

impl CspConfig {
    pub fn header_name(&self) -> HeaderName {
        if self.report_only {
            CONTENT_SECURITY_POLICY_REPORT_ONLY
        } else {
            CONTENT_SECURITY_POLICY
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Requests slower than this are logged at `warn`
    pub slow_threshold: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExternalLogConfig {
    pub enabled: bool,
    /// Base URL of the HTTP sink; `None` logs through `tracing` instead
    pub endpoint: Option<String>,
    /// Spawn sink writes instead of awaiting them before responding
    pub detached: bool,
}

/// Account freeze enforcement
#[derive(Debug, Clone)]
pub struct FreezeConfig {
    pub logout_route: String,
    pub logout_path: String,
    /// Route names a temporarily frozen account may still hit with any method
    pub frozen_allowed_routes: Vec<String>,
    pub banned_message: String,
    /// `:until` is replaced by the formatted expiry time
    pub frozen_message: String,
    /// Penalty counters older than this are reset on every request
    pub penalty_retention: chrono::Duration,
}

/// Expiry time format in freeze messages (`YYYY-MM-DD HH:mm`, UTC)
pub const FREEZE_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M";

impl Default for FreezeConfig {
    fn default() -> Self {
        Self {
            logout_route: "logout".to_string(),
            logout_path: "/logout".to_string(),
            frozen_allowed_routes: [
                "threads.index",
                "threads.show",
                "threads.search",
                "threads.tag",
                "threads.category",
                "profile.show",
                "logout",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            banned_message: "Your account has been permanently suspended.".to_string(),
            frozen_message: "Your account is frozen until :until. Posting and other changes are disabled until then.".to_string(),
            penalty_retention: chrono::Duration::days(365),
        }
    }
}

impl FreezeConfig {
    pub fn frozen_message_until(&self, until: DateTime<Utc>) -> String {
        self.frozen_message
            .replace(":until", &until.format(FREEZE_EXPIRY_FORMAT).to_string())
    }

    pub fn allows_while_frozen(&self, route_name: Option<&str>) -> bool {
        route_name.is_some_and(|name| self.frozen_allowed_routes.iter().any(|r| r == name))
    }

    /// By route name or by path, so both the link (GET) and the form
    /// (POST) reach logout.
    pub fn is_logout(&self, route_name: Option<&str>, path: &str) -> bool {
        route_name == Some(self.logout_route.as_str())
            || path.trim_end_matches('/') == self.logout_path
    }
}

/// A named limiter and the route names it guards
#[derive(Debug, Clone)]
pub struct LimiterBinding {
    pub limit: NamedLimit,
    pub routes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LimiterCatalog {
    pub bindings: Vec<LimiterBinding>,
    /// Requests under this prefix without a more specific binding use `api`
    pub api_prefix: PathPrefix,
}

impl Default for LimiterCatalog {
    fn default() -> Self {
        let bind = |limit: NamedLimit, routes: &[&str]| LimiterBinding {
            limit,
            routes: routes.iter().map(|r| r.to_string()).collect(),
        };
        Self {
            bindings: vec![
                bind(NamedLimit::LOGIN, &["login.store"]),
                bind(NamedLimit::VERIFICATION, &["verification.send"]),
                bind(NamedLimit::POST, &["threads.store", "responses.store"]),
            ],
            api_prefix: PathPrefix::new("api"),
        }
    }
}

impl LimiterCatalog {
    /// Route-name bindings first, then the API prefix.
    pub fn select(&self, route_name: Option<&str>, path: &str) -> Option<NamedLimit> {
        route_name
            .and_then(|name| {
                self.bindings
                    .iter()
                    .find(|binding| binding.routes.iter().any(|r| r == name))
                    .map(|binding| binding.limit)
            })
            .or_else(|| self.api_prefix.matches(path).then_some(NamedLimit::API))
    }
}

/// Everything the pipeline is configured with
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub environment: AppEnvironment,
    pub session_cookie_name: String,
    /// Reverse proxies allowed to set `X-Forwarded-For` (`TRUSTED_PROXIES`)
    pub trusted_proxies: Vec<IpAddr>,
    pub admin: AdminGateConfig,
    pub csp: CspConfig,
    pub timing: TimingConfig,
    pub external_log: ExternalLogConfig,
    pub freeze: FreezeConfig,
    pub rate_limits: LimiterCatalog,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::default(),
            session_cookie_name: "bbs_session".to_string(),
            trusted_proxies: Vec::new(),
            admin: AdminGateConfig::with_random_prefix(),
            csp: CspConfig::default(),
            timing: TimingConfig::default(),
            external_log: ExternalLogConfig {
                enabled: AppEnvironment::default().is_production(),
                ..Default::default()
            },
            freeze: FreezeConfig::default(),
            rate_limits: LimiterCatalog::default(),
        }
    }
}

impl PipelineConfig {
    /// Read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let environment = match get("APP_ENV") {
            Some(value) => AppEnvironment::from_code(&value).ok_or(ConfigError::InvalidValue {
                name: "APP_ENV",
                value,
            })?,
            None => AppEnvironment::default(),
        };

        let admin = match get("ADMIN_PATH_PREFIX") {
            Some(prefix) => AdminGateConfig {
                path_prefix: PathPrefix::new(prefix),
                password_pepper: None,
            },
            None => {
                let generated = AdminGateConfig::with_random_prefix();
                tracing::warn!(
                    prefix = %generated.path_prefix.as_str(),
                    "ADMIN_PATH_PREFIX not set, generated a random admin prefix for this process"
                );
                generated
            }
        };
        let admin = AdminGateConfig {
            password_pepper: get("ADMIN_PASSWORD_PEPPER").map(String::into_bytes),
            ..admin
        };

        let mut policy = CspPolicy::default();
        if let Some(uri) = get("CSP_REPORT_URI") {
            policy = policy.with_report_uri(uri);
        }
        let csp = CspConfig {
            enabled: parse_bool("CSP_ENABLED", get("CSP_ENABLED"), true)?,
            report_only: parse_bool("CSP_REPORT_ONLY", get("CSP_REPORT_ONLY"), false)?,
            policy,
            diagnostics_prefix: PathPrefix::new(
                get("DIAGNOSTICS_PATH").unwrap_or_else(|| "telescope".to_string()),
            ),
        };

        let timing = TimingConfig {
            slow_threshold: Duration::from_millis(parse_u64(
                "SLOW_REQUEST_MS",
                get("SLOW_REQUEST_MS"),
                500,
            )?),
        };

        let external_log = ExternalLogConfig {
            enabled: parse_bool(
                "EXTERNAL_LOGGING_ENABLED",
                get("EXTERNAL_LOGGING_ENABLED"),
                environment.is_production(),
            )?,
            endpoint: get("EXTERNAL_LOG_ENDPOINT"),
            detached: parse_bool("EXTERNAL_LOG_DETACHED", get("EXTERNAL_LOG_DETACHED"), false)?,
        };

        Ok(Self {
            environment,
            session_cookie_name: get("SESSION_COOKIE").unwrap_or_else(|| "bbs_session".to_string()),
            trusted_proxies: parse_ip_list("TRUSTED_PROXIES", get("TRUSTED_PROXIES"))?,
            admin,
            csp,
            timing,
            external_log,
            freeze: FreezeConfig::default(),
            rate_limits: LimiterCatalog::default(),
        })
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

fn parse_ip_list(name: &'static str, value: Option<String>) -> Result<Vec<IpAddr>, ConfigError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse().map_err(|_| ConfigError::InvalidValue {
                name,
                value: item.to_string(),
            })
        })
        .collect()
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}
