//! Per-request context shared through request extensions.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request};
use platform::client::{extract_client_ip, extract_user_agent};

use crate::domain::entity::principal::Principal;
use kernel::id::AdminId;

/// Resolved once per request by the request-context policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Client IP as text, `"unknown"` when it cannot be determined
    pub client_ip: String,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub route_name: Option<String>,
}

impl RequestContext {
    /// Context without session or route resolution. `X-Forwarded-For` is
    /// read only when the peer is one of `trusted_proxies`.
    pub fn from_headers(request: &Request, trusted_proxies: &[IpAddr]) -> Self {
        let direct_ip: Option<IpAddr> = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());

        Self {
            client_ip: extract_client_ip(request.headers(), direct_ip, trusted_proxies)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: extract_user_agent(request.headers()),
            session_id: None,
            route_name: None,
        }
    }

    /// The context stored on the request, or one derived from headers when
    /// the request-context policy has not run.
    pub fn of(request: &Request) -> Self {
        request
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| Self::from_headers(request, &[]))
    }

    pub fn route_name(&self) -> Option<&str> {
        self.route_name.as_deref()
    }
}

/// The authenticated forum user, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPrincipal(pub Principal);

impl CurrentPrincipal {
    pub fn of(request: &Request) -> Option<&Principal> {
        request
            .extensions()
            .get::<CurrentPrincipal>()
            .map(|current| &current.0)
    }
}

/// Set by the admin gate once Basic credentials verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAdmin {
    pub id: AdminId,
    pub username: String,
}
