//! Account State Use Case
//!
//! Evaluated on every request:
//! 1. Reset penalty counters past their retention (always, even for guests)
//! 2. Lazily clear an expired temporary freeze and persist the change
//! 3. Decide whether the request may proceed
//!
//! Step 2 runs before step 3, so a freeze that just ran out already counts
//! as `Active` for the request that observed it.

use std::sync::Arc;

use axum::http::Method;
use chrono::{DateTime, Utc};

use crate::application::config::FreezeConfig;
use crate::domain::entity::principal::Principal;
use crate::domain::repository::{PenaltyRepository, PrincipalRepository};
use crate::domain::value_object::account_state::AccountState;
use crate::error::best_effort;

/// Where a denied request is sent back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialRedirect {
    /// The logout route (banned account, GET)
    Logout,
    /// The previous page
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Attached to the `frozen` field
    pub message: String,
    pub redirect: DenialRedirect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(Denial),
}

/// The parts of a request the decision depends on
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub method: &'a Method,
    pub route_name: Option<&'a str>,
    pub path: &'a str,
}

/// Pure decision for a principal already known to be in `state`.
pub fn decide(config: &FreezeConfig, state: AccountState, request: RequestFacts<'_>) -> AccessDecision {
    match state {
        AccountState::Active => AccessDecision::Allow,
        AccountState::PermanentlyBanned => {
            if config.is_logout(request.route_name, request.path) {
                return AccessDecision::Allow;
            }
            let redirect = if request.method == Method::GET {
                DenialRedirect::Logout
            } else {
                DenialRedirect::Back
            };
            AccessDecision::Deny(Denial {
                message: config.banned_message.clone(),
                redirect,
            })
        }
        AccountState::TemporarilyFrozen { until } => {
            if request.method == Method::GET || config.allows_while_frozen(request.route_name) {
                return AccessDecision::Allow;
            }
            AccessDecision::Deny(Denial {
                message: config.frozen_message_until(until),
                redirect: DenialRedirect::Back,
            })
        }
    }
}

/// Account state enforcement use case
pub struct EnforceAccountStateUseCase<R>
where
    R: PrincipalRepository + PenaltyRepository,
{
    repo: Arc<R>,
    config: Arc<FreezeConfig>,
}

impl<R> EnforceAccountStateUseCase<R>
where
    R: PrincipalRepository + PenaltyRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<FreezeConfig>) -> Self {
        Self { repo, config }
    }

    /// `principal` is updated in place when its freeze is cleared.
    pub async fn execute(
        &self,
        principal: Option<&mut Principal>,
        request: RequestFacts<'_>,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let cutoff = now - self.config.penalty_retention;
        if let Some(reset) = best_effort(
            "reset expired out-counts",
            self.repo.reset_expired_out_counts(cutoff).await,
        ) {
            if reset > 0 {
                tracing::debug!(accounts = reset, "Expired penalty counters reset");
            }
        }

        let Some(principal) = principal else {
            return AccessDecision::Allow;
        };

        if principal.clear_expired_freeze(now) {
            tracing::info!(user_id = %principal.id, "Temporary freeze expired");
            best_effort(
                "clear expired freeze",
                self.repo.clear_frozen_until(principal.id).await,
            );
        }

        let state = principal.account_state(now);
        let decision = decide(&self.config, state, request);
        if let AccessDecision::Deny(denial) = &decision {
            tracing::info!(
                user_id = %principal.id,
                state = %state,
                method = %request.method,
                path = %request.path,
                redirect = ?denial.redirect,
                "Request denied by account state"
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn facts<'a>(method: &'a Method, route_name: Option<&'a str>, path: &'a str) -> RequestFacts<'a> {
        RequestFacts {
            method,
            route_name,
            path,
        }
    }

    #[test]
    fn test_active_is_always_allowed() {
        let config = FreezeConfig::default();
        let decision = decide(
            &config,
            AccountState::Active,
            facts(&Method::DELETE, Some("threads.destroy"), "/threads/1"),
        );
        assert_eq!(decision, AccessDecision::Allow);
    }

    #[test]
    fn test_banned_get_goes_to_logout() {
        let config = FreezeConfig::default();
        let decision = decide(
            &config,
            AccountState::PermanentlyBanned,
            facts(&Method::GET, Some("threads.index"), "/threads"),
        );
        assert_eq!(
            decision,
            AccessDecision::Deny(Denial {
                message: config.banned_message.clone(),
                redirect: DenialRedirect::Logout,
            })
        );
    }

    #[test]
    fn test_banned_post_goes_back() {
        let config = FreezeConfig::default();
        let decision = decide(
            &config,
            AccountState::PermanentlyBanned,
            facts(&Method::POST, Some("responses.store"), "/threads/1/responses"),
        );
        assert!(matches!(
            decision,
            AccessDecision::Deny(Denial {
                redirect: DenialRedirect::Back,
                ..
            })
        ));
    }

    #[test]
    fn test_banned_may_log_out() {
        let config = FreezeConfig::default();
        for method in [Method::GET, Method::POST] {
            assert_eq!(
                decide(
                    &config,
                    AccountState::PermanentlyBanned,
                    facts(&method, Some("logout"), "/logout"),
                ),
                AccessDecision::Allow
            );
        }
        // Unnamed route, matched by path
        assert_eq!(
            decide(
                &config,
                AccountState::PermanentlyBanned,
                facts(&Method::POST, None, "/logout"),
            ),
            AccessDecision::Allow
        );
    }

    #[test]
    fn test_frozen_allows_reads_and_allow_list() {
        let config = FreezeConfig::default();
        let state = AccountState::TemporarilyFrozen {
            until: Utc::now() + Duration::hours(1),
        };

        assert_eq!(
            decide(&config, state, facts(&Method::GET, Some("coins.index"), "/coins")),
            AccessDecision::Allow
        );
        assert_eq!(
            decide(&config, state, facts(&Method::POST, Some("threads.search"), "/threads/search")),
            AccessDecision::Allow
        );
        assert_eq!(
            decide(&config, state, facts(&Method::POST, Some("logout"), "/logout")),
            AccessDecision::Allow
        );
    }

    #[test]
    fn test_frozen_write_is_denied_with_expiry() {
        let config = FreezeConfig::default();
        let until = DateTime::parse_from_rfc3339("2031-05-06T07:08:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let decision = decide(
            &config,
            AccountState::TemporarilyFrozen { until },
            facts(&Method::POST, Some("responses.store"), "/threads/1/responses"),
        );

        let AccessDecision::Deny(denial) = decision else {
            panic!("expected a denial");
        };
        assert_eq!(denial.redirect, DenialRedirect::Back);
        assert!(denial.message.contains("2031-05-06 07:08"));
    }
}
