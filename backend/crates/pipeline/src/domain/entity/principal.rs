//! Principal Entity
//!
//! The authenticated forum user as the pipeline sees it: an id plus the
//! freeze and ban fields the account-state policy enforces.

use chrono::{DateTime, Utc};
use kernel::id::UserId;

use crate::domain::value_object::account_state::AccountState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub name: String,
    /// End of a temporary freeze. Once in the past it is cleared lazily by
    /// the next request that observes it.
    pub frozen_until: Option<DateTime<Utc>>,
    pub is_permanently_banned: bool,
}

impl Principal {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            frozen_until: None,
            is_permanently_banned: false,
        }
    }

    /// Temporarily frozen at `now`
    pub fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        self.frozen_until.is_some_and(|until| until > now)
    }

    /// A freeze is recorded but has already run out.
    pub fn has_expired_freeze(&self, now: DateTime<Utc>) -> bool {
        self.frozen_until.is_some_and(|until| until <= now)
    }

    /// Clear an expired freeze. Returns whether anything changed, i.e.
    /// whether the change has to be persisted.
    pub fn clear_expired_freeze(&mut self, now: DateTime<Utc>) -> bool {
        if self.has_expired_freeze(now) {
            self.frozen_until = None;
            true
        } else {
            false
        }
    }

    /// A permanent ban wins over any freeze.
    pub fn account_state(&self, now: DateTime<Utc>) -> AccountState {
        if self.is_permanently_banned {
            return AccountState::PermanentlyBanned;
        }
        match self.frozen_until {
            Some(until) if until > now => AccountState::TemporarilyFrozen { until },
            _ => AccountState::Active,
        }
    }
}
