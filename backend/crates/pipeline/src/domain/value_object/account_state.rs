//! Account State Value Object
//!
//! What the account-state policy enforces for an authenticated principal.
//! Derived fresh on every request from the principal's freeze fields; never
//! stored.
//!
//! ## States
//! - **Active**: no restriction
//! - **TemporarilyFrozen**: read-only browsing until `until`
//! - **PermanentlyBanned**: only logging out is allowed

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccountState {
    #[default]
    Active,
    TemporarilyFrozen { until: DateTime<Utc> },
    PermanentlyBanned,
}

impl AccountState {
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::TemporarilyFrozen { .. } => "temporarily_frozen",
            Self::PermanentlyBanned => "permanently_banned",
        }
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
