//! Policies, one concern each.

pub mod access_log;
pub mod account_state;
pub mod admin_gate;
pub mod external_log;
pub mod rate_limit;
pub mod request_context;
pub mod security_headers;
pub mod timing;

pub use access_log::{AdminVisitLogPolicy, GuestVisitLogPolicy};
pub use account_state::AccountStatePolicy;
pub use admin_gate::AdminGatePolicy;
pub use external_log::ExternalLogPolicy;
pub use rate_limit::RateLimitPolicy;
pub use request_context::RequestContextPolicy;
pub use security_headers::SecurityHeadersPolicy;
pub use timing::TimingPolicy;
