//! Admin Gate Policy
//!
//! HTTP Basic check in front of the admin subtree. Basic Auth is re-sent
//! with every request, so every request under the prefix is verified and
//! every success writes an `admin_login` entry.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};

use crate::application::admin_login::{AdminLoginInput, AdminLoginUseCase};
use crate::application::config::AdminGateConfig;
use crate::domain::entity::access_log::{AccessLogEntry, AccessLogKind};
use crate::domain::repository::{AccessLogRepository, AdminAccountRepository};
use crate::error::best_effort;
use crate::presentation::basic_auth::BasicCredentials;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{AuthenticatedAdmin, CurrentPrincipal, RequestContext};

pub struct AdminGatePolicy<R>
where
    R: AdminAccountRepository + AccessLogRepository + Send + Sync + 'static,
{
    repo: Arc<R>,
    config: Arc<AdminGateConfig>,
    login: AdminLoginUseCase<R>,
}

impl<R> AdminGatePolicy<R>
where
    R: AdminAccountRepository + AccessLogRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, config: Arc<AdminGateConfig>) -> Self {
        let login = AdminLoginUseCase::new(repo.clone(), config.clone());
        Self {
            repo,
            config,
            login,
        }
    }
}

#[async_trait]
impl<R> Policy for AdminGatePolicy<R>
where
    R: AdminAccountRepository + AccessLogRepository + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "admin_gate"
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Response {
        if !self.config.path_prefix.matches(request.uri().path()) {
            return next.run(request).await;
        }

        let credentials = match BasicCredentials::from_headers(request.headers()) {
            Ok(credentials) => credentials,
            Err(e) => return e.into_response(),
        };

        let input = AdminLoginInput {
            login: credentials.username,
            password: credentials.password,
        };
        let account = match self.login.execute(input).await {
            Ok(account) => account,
            Err(e) => return e.into_response(),
        };

        let context = RequestContext::of(&request);
        let user_id = CurrentPrincipal::of(&request).map(|principal| principal.id);
        let entry = AccessLogEntry::new(
            AccessLogKind::AdminLogin,
            user_id,
            request.uri().path(),
            context.client_ip,
        );
        best_effort("record admin login", self.repo.record(&entry).await);

        tracing::info!(admin_id = %account.id, username = %account.username, "Admin authenticated");

        request.extensions_mut().insert(AuthenticatedAdmin {
            id: account.id,
            username: account.username,
        });

        next.run(request).await
    }
}
