//! Rate Limit Policy
//!
//! Picks the named limiter for the request (route binding, then the API
//! prefix) and asks the [`RateLimitStore`]. The counting itself lives in
//! the store. A failing store lets the request through.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use kernel::error::app_error::AppError;
use platform::rate_limit::RateLimitStore;

use crate::application::config::LimiterCatalog;
use crate::presentation::chain::{Next, Policy};
use crate::presentation::context::{CurrentPrincipal, RequestContext};

pub struct RateLimitPolicy<S> {
    store: Arc<S>,
    catalog: Arc<LimiterCatalog>,
}

impl<S> RateLimitPolicy<S>
where
    S: RateLimitStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, catalog: Arc<LimiterCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl<S> Policy for RateLimitPolicy<S>
where
    S: RateLimitStore + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Response {
        let context = RequestContext::of(&request);
        let Some(limit) = self
            .catalog
            .select(context.route_name(), request.uri().path())
        else {
            return next.run(request).await;
        };

        let user_id = CurrentPrincipal::of(&request).map(|principal| principal.id.to_string());
        let key = limit.bucket_key(user_id.as_deref(), &context.client_ip);

        let checked = self.store.check_and_increment(&key, &limit.config).await;
        let result = match checked {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(limiter = limit.name, error = %e, "Rate limit check failed, allowing request");
                return next.run(request).await;
            }
        };

        if result.allowed {
            return next.run(request).await;
        }

        let retry_after = result.retry_after_secs(Utc::now().timestamp_millis());
        tracing::info!(limiter = limit.name, key = %key, retry_after, "Rate limit exceeded");

        let mut response = AppError::too_many_requests("Too many requests")
            .with_action("Please wait before retrying")
            .into_response();
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
