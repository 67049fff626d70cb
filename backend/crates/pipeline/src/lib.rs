//! Request Pipeline
//!
//! The ordered chain of policies every HTTP request of the forum passes
//! through before it reaches a route handler.
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Configuration and use cases (admin login, account state)
//! - `infra/` - PostgreSQL store and external log sinks
//! - `presentation/` - The `Policy` chain, request context and every policy
//!
//! ## Failure model
//! - Access-log writes, freeze clearing and sink writes are best-effort:
//!   their failures are logged and never change the response
//! - Only the admin gate (401) and the account-state policy (redirect with a
//!   `frozen` field error) deny requests on purpose
//! - A panic in a route handler is caught by the timing policy and turned
//!   into a 500

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

pub use application::config::PipelineConfig;
pub use error::{AdminAuthError, ConfigError, SinkError, StorageError, StorageResult, best_effort};
pub use infra::log_sink::{HttpLogSink, LogSink, TracingLogSink};
pub use infra::postgres::PgPipelineStore;
pub use presentation::chain::{Endpoint, Next, Pipeline, PipelineBuilder, PipelineLayer, Policy};
pub use presentation::context::{AuthenticatedAdmin, CurrentPrincipal, RequestContext};
pub use presentation::default_pipeline;

pub use kernel::error::{
    app_error::{AppError, AppResult, FieldErrors},
    kind::ErrorKind,
};

#[cfg(test)]
mod tests;
