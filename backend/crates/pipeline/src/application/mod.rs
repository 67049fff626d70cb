//! Application Layer
//!
//! Configuration and use cases.

pub mod account_state;
pub mod admin_login;
pub mod config;

// Re-exports
pub use account_state::{AccessDecision, Denial, DenialRedirect, EnforceAccountStateUseCase};
pub use admin_login::{AdminLoginInput, AdminLoginUseCase};
pub use config::PipelineConfig;
