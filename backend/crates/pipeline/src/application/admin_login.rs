//! Admin Login Use Case
//!
//! Verifies one set of Basic credentials against the admin accounts.
//! Basic Auth is re-sent on every request, so this runs on every request
//! into the admin area.

use std::sync::Arc;

use platform::password::ClearTextPassword;

use crate::application::config::AdminGateConfig;
use crate::domain::entity::admin_account::AdminAccount;
use crate::domain::repository::AdminAccountRepository;
use crate::error::AdminAuthError;

/// Admin login input
pub struct AdminLoginInput {
    /// Username or email
    pub login: String,
    pub password: ClearTextPassword,
}

/// Admin login use case
pub struct AdminLoginUseCase<R>
where
    R: AdminAccountRepository,
{
    repo: Arc<R>,
    config: Arc<AdminGateConfig>,
}

impl<R> AdminLoginUseCase<R>
where
    R: AdminAccountRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AdminGateConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn execute(&self, input: AdminLoginInput) -> Result<AdminAccount, AdminAuthError> {
        let account = self
            .repo
            .find_by_login(&input.login)
            .await?
            .ok_or(AdminAuthError::UnknownAccount)?;

        // Argon2 is CPU-bound: keep it off the async workers
        let pepper = self.config.pepper().map(<[u8]>::to_vec);
        let verified = tokio::task::spawn_blocking(move || {
            let valid = account.verify_password(&input.password, pepper.as_deref());
            (account, valid)
        })
        .await;

        match verified {
            Ok((account, true)) => {
                tracing::debug!(admin_id = %account.id, "Admin credentials verified");
                Ok(account)
            }
            Ok((_, false)) => Err(AdminAuthError::InvalidPassword),
            Err(e) => {
                tracing::error!(error = %e, "Admin password verification task panicked");
                Err(AdminAuthError::VerifierUnavailable)
            }
        }
    }
}
