//! Request Context Policy
//!
//! Resolves the client, the session, the route name and the authenticated
//! principal once, so later policies only read request extensions.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use platform::cookie::extract_cookie;

use crate::domain::entity::principal::Principal;
use crate::domain::repository::{PrincipalRepository, SessionStore};
use crate::domain::value_object::route::RouteTable;
use crate::error::StorageResult;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{CurrentPrincipal, RequestContext};

pub struct RequestContextPolicy<R> {
    repo: Arc<R>,
    routes: Arc<RouteTable>,
    session_cookie_name: String,
    trusted_proxies: Vec<IpAddr>,
}

impl<R> RequestContextPolicy<R>
where
    R: SessionStore + PrincipalRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, routes: Arc<RouteTable>, session_cookie_name: impl Into<String>) -> Self {
        Self {
            repo,
            routes,
            session_cookie_name: session_cookie_name.into(),
            trusted_proxies: Vec::new(),
        }
    }

    /// Peers whose `X-Forwarded-For` is believed.
    pub fn with_trusted_proxies(mut self, trusted_proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    async fn lookup_principal(&self, session_id: &str) -> StorageResult<Option<Principal>> {
        match self.repo.user_id(session_id).await? {
            Some(user_id) => self.repo.find_by_id(user_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<R> Policy for RequestContextPolicy<R>
where
    R: SessionStore + PrincipalRepository + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "request_context"
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Response {
        let mut context = RequestContext::from_headers(&request, &self.trusted_proxies);
        context.session_id = extract_cookie(request.headers(), &self.session_cookie_name);
        context.route_name = self
            .routes
            .resolve(request.method(), request.uri().path())
            .map(str::to_string);

        let principal = match context.session_id.as_deref() {
            Some(session_id) => match self.lookup_principal(session_id).await {
                Ok(principal) => principal,
                Err(e) => {
                    tracing::warn!(error = %e, "Principal lookup failed, treating request as anonymous");
                    None
                }
            },
            None => None,
        };

        tracing::debug!(
            ip = %context.client_ip,
            route = context.route_name.as_deref(),
            authenticated = principal.is_some(),
            "Request context resolved"
        );

        if let Some(principal) = principal {
            request.extensions_mut().insert(CurrentPrincipal(principal));
        }
        request.extensions_mut().insert(context);

        next.run(request).await
    }
}
