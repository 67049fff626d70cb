//! Security Headers Policy
//!
//! Generates the per-request CSP nonce, hands it to the rendering layer
//! (request extension, and the session when there is one) and sets
//! `X-Frame-Options` and the CSP header on the way out.
//!
//! Requests under the diagnostics prefix pass through untouched.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::response::Response;

use crate::application::config::CspConfig;
use crate::domain::repository::SessionStore;
use crate::domain::value_object::csp::CspNonce;
use crate::error::best_effort;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::RequestContext;

/// Session key the nonce is stored under
pub const SESSION_NONCE_KEY: &str = "csp_nonce";

pub struct SecurityHeadersPolicy<S> {
    sessions: Arc<S>,
    config: Arc<CspConfig>,
}

impl<S> SecurityHeadersPolicy<S>
where
    S: SessionStore + Send + Sync + 'static,
{
    pub fn new(sessions: Arc<S>, config: Arc<CspConfig>) -> Self {
        Self { sessions, config }
    }
}

#[async_trait]
impl<S> Policy for SecurityHeadersPolicy<S>
where
    S: SessionStore + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Response {
        if self.config.diagnostics_prefix.matches(request.uri().path()) {
            return next.run(request).await;
        }

        let nonce = CspNonce::generate();
        let session_id = RequestContext::of(&request).session_id;

        if let Some(session_id) = session_id {
            best_effort(
                "store csp nonce",
                self.sessions
                    .put(
                        &session_id,
                        SESSION_NONCE_KEY,
                        serde_json::Value::String(nonce.as_str().to_string()),
                    )
                    .await,
            );
        }
        request.extensions_mut().insert(nonce.clone());

        let mut response = next.run(request).await;

        let headers = response.headers_mut();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

        if self.config.enabled {
            match HeaderValue::from_str(&self.config.policy.header_value(&nonce)) {
                Ok(value) => {
                    headers.insert(self.config.header_name(), value);
                }
                Err(e) => {
                    tracing::error!(error = %e, "CSP header value is not a valid header");
                }
            }
        }

        response
    }
}
