//! Access Logging Policies
//!
//! - [`GuestVisitLogPolicy`]: anonymous GET outside the admin area
//! - [`AdminVisitLogPolicy`]: every request that passed the admin gate
//!
//! Both write before delegating and never look at the response. Storage
//! failures go through [`best_effort`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;

use crate::domain::entity::access_log::{AccessLogEntry, AccessLogKind};
use crate::domain::repository::AccessLogRepository;
use crate::domain::value_object::route::PathPrefix;
use crate::error::best_effort;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{AuthenticatedAdmin, CurrentPrincipal, RequestContext};

pub struct GuestVisitLogPolicy<R> {
    repo: Arc<R>,
    admin_prefix: PathPrefix,
}

impl<R> GuestVisitLogPolicy<R>
where
    R: AccessLogRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, admin_prefix: PathPrefix) -> Self {
        Self { repo, admin_prefix }
    }

    fn applies_to(&self, request: &Request) -> bool {
        request.method() == Method::GET
            && CurrentPrincipal::of(request).is_none()
            && !self.admin_prefix.matches(request.uri().path())
    }
}

#[async_trait]
impl<R> Policy for GuestVisitLogPolicy<R>
where
    R: AccessLogRepository + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "guest_visit_log"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Response {
        if self.applies_to(&request) {
            let context = RequestContext::of(&request);
            let entry = AccessLogEntry::guest_visit(request.uri().path(), context.client_ip);
            best_effort("record guest visit", self.repo.record(&entry).await);
        }

        next.run(request).await
    }
}

pub struct AdminVisitLogPolicy<R> {
    repo: Arc<R>,
    admin_prefix: PathPrefix,
}

impl<R> AdminVisitLogPolicy<R>
where
    R: AccessLogRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, admin_prefix: PathPrefix) -> Self {
        Self { repo, admin_prefix }
    }
}

#[async_trait]
impl<R> Policy for AdminVisitLogPolicy<R>
where
    R: AccessLogRepository + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "admin_visit_log"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Response {
        let passed_gate = request.extensions().get::<AuthenticatedAdmin>().is_some();

        if passed_gate && self.admin_prefix.matches(request.uri().path()) {
            let context = RequestContext::of(&request);
            let user_id = CurrentPrincipal::of(&request).map(|principal| principal.id);
            let entry = AccessLogEntry::new(
                AccessLogKind::AdminVisit,
                user_id,
                request.uri().path(),
                context.client_ip,
            );
            best_effort("record admin visit", self.repo.record(&entry).await);
        }

        next.run(request).await
    }
}
