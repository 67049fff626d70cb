//! Account State Policy
//!
//! Runs [`EnforceAccountStateUseCase`] for every request and turns a denial
//! into a `302` back to the previous page (or to logout for a banned GET).
//! Only a same-origin `Referer` counts as the previous page.
//! The message is flashed to the session under `errors` and attached to the
//! response as a [`FieldErrors`] extension.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use kernel::error::app_error::FieldErrors;

use crate::application::account_state::{
    AccessDecision, Denial, DenialRedirect, EnforceAccountStateUseCase, RequestFacts,
};
use crate::application::config::FreezeConfig;
use crate::domain::repository::{PenaltyRepository, PrincipalRepository, SessionStore};
use crate::error::best_effort;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{CurrentPrincipal, RequestContext};

/// Field the denial message is attached to
pub const FROZEN_FIELD: &str = "frozen";
/// Session key of the flashed field errors
pub const SESSION_ERRORS_KEY: &str = "errors";

pub struct AccountStatePolicy<R>
where
    R: PrincipalRepository + PenaltyRepository + SessionStore + Send + Sync + 'static,
{
    repo: Arc<R>,
    config: Arc<FreezeConfig>,
    enforce: EnforceAccountStateUseCase<R>,
}

impl<R> AccountStatePolicy<R>
where
    R: PrincipalRepository + PenaltyRepository + SessionStore + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, config: Arc<FreezeConfig>) -> Self {
        let enforce = EnforceAccountStateUseCase::new(repo.clone(), config.clone());
        Self {
            repo,
            config,
            enforce,
        }
    }

    fn location(&self, request: &Request, redirect: DenialRedirect) -> HeaderValue {
        match redirect {
            DenialRedirect::Logout => HeaderValue::from_str(&self.config.logout_path)
                .unwrap_or_else(|_| HeaderValue::from_static("/logout")),
            DenialRedirect::Back => same_origin_referer(request.headers())
                .unwrap_or_else(|| HeaderValue::from_static("/")),
        }
    }

    async fn deny(&self, location: HeaderValue, session_id: Option<&str>, denial: Denial) -> Response {
        let errors = FieldErrors::single(FROZEN_FIELD, denial.message);

        if let Some(session_id) = session_id {
            best_effort(
                "flash account state error",
                self.repo
                    .put(session_id, SESSION_ERRORS_KEY, errors.to_json())
                    .await,
            );
        }

        let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
        response.extensions_mut().insert(errors);
        response
    }
}

#[async_trait]
impl<R> Policy for AccountStatePolicy<R>
where
    R: PrincipalRepository + PenaltyRepository + SessionStore + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "account_state"
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Response {
        let context = RequestContext::of(&request);
        let mut principal = CurrentPrincipal::of(&request).cloned();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let facts = RequestFacts {
            method: &method,
            route_name: context.route_name(),
            path: &path,
        };
        let decision = self
            .enforce
            .execute(principal.as_mut(), facts, Utc::now())
            .await;

        match decision {
            AccessDecision::Allow => {
                // Downstream sees the principal with an expired freeze cleared
                if let Some(principal) = principal {
                    request.extensions_mut().insert(CurrentPrincipal(principal));
                }
                next.run(request).await
            }
            AccessDecision::Deny(denial) => {
                let location = self.location(&request, denial.redirect);
                self.deny(location, context.session_id.as_deref(), denial)
                    .await
            }
        }
    }
}

/// The `Referer` as a site-relative location, if it points at this host.
fn same_origin_referer(headers: &HeaderMap) -> Option<HeaderValue> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;

    if let Some(rest) = referer.strip_prefix('/') {
        // "//host" and "/\\host" are read as protocol-relative by browsers
        if rest.starts_with('/') || rest.starts_with('\\') {
            return None;
        }
        return HeaderValue::from_str(referer).ok();
    }

    let uri: Uri = referer.parse().ok()?;
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let same_host = uri
        .authority()
        .is_some_and(|authority| authority.as_str().eq_ignore_ascii_case(host));
    if !same_host || !matches!(uri.scheme_str(), Some("http" | "https")) {
        return None;
    }

    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    HeaderValue::from_str(path).ok()
}
