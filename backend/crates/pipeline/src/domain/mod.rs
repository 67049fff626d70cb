//! Domain Layer
//!
//! Contains entities, value objects, and repository traits.

pub mod entity;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{
    access_log::{AccessLogEntry, AccessLogKind},
    admin_account::AdminAccount,
    external_log::{AccessRecord, Anomaly},
    principal::Principal,
};
pub use repository::{
    AccessLogRepository, AdminAccountRepository, ExternalLogSink, PenaltyRepository,
    PrincipalRepository, SessionStore,
};
pub use value_object::{
    account_state::AccountState,
    csp::{CspDirective, CspNonce, CspPolicy},
    route::{PathPrefix, RouteTable},
};
