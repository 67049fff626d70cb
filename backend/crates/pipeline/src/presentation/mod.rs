//! Presentation Layer
//!
//! The policy chain, request context and the policies themselves.

pub mod basic_auth;
pub mod chain;
pub mod context;
pub mod policies;

use std::sync::Arc;

use platform::rate_limit::RateLimitStore;

use crate::application::config::PipelineConfig;
use crate::domain::repository::{
    AccessLogRepository, AdminAccountRepository, ExternalLogSink, PenaltyRepository,
    PrincipalRepository, SessionStore,
};
use crate::domain::value_object::route::RouteTable;

pub use chain::{Endpoint, Next, Pipeline, PipelineBuilder, PipelineLayer, Policy};
pub use context::{AuthenticatedAdmin, CurrentPrincipal, RequestContext};
use policies::*;

/// The forum pipeline, outermost first:
///
/// `request_context`, `security_headers`, `external_log` (when enabled),
/// `timing`, `guest_visit_log`, `admin_gate`, `admin_visit_log`,
/// `rate_limit`, `account_state`.
///
/// `security_headers` sits outside `timing` so the 500 built for a panic
/// still carries the frame and CSP headers.
pub fn default_pipeline<S, K>(
    config: &PipelineConfig,
    store: Arc<S>,
    sink: Arc<K>,
    routes: Arc<RouteTable>,
) -> Pipeline
where
    S: SessionStore
        + PrincipalRepository
        + PenaltyRepository
        + AccessLogRepository
        + AdminAccountRepository
        + RateLimitStore
        + Send
        + Sync
        + 'static,
    K: ExternalLogSink + Send + Sync + 'static,
{
    let admin = Arc::new(config.admin.clone());
    let admin_prefix = config.admin.path_prefix.clone();

    Pipeline::builder()
        .then(
            RequestContextPolicy::new(store.clone(), routes, config.session_cookie_name.clone())
                .with_trusted_proxies(config.trusted_proxies.clone()),
        )
        .then(SecurityHeadersPolicy::new(
            store.clone(),
            Arc::new(config.csp.clone()),
        ))
        .then_if(
            config.external_log.enabled,
            ExternalLogPolicy::new(sink, config.external_log.detached),
        )
        .then(TimingPolicy::new(config.environment, &config.timing))
        .then(GuestVisitLogPolicy::new(store.clone(), admin_prefix.clone()))
        .then(AdminGatePolicy::new(store.clone(), admin))
        .then(AdminVisitLogPolicy::new(store.clone(), admin_prefix))
        .then(RateLimitPolicy::new(
            store.clone(),
            Arc::new(config.rate_limits.clone()),
        ))
        .then(AccountStatePolicy::new(store, Arc::new(config.freeze.clone())))
        .build()
}
