//! Admin Account Entity
//!
//! Staff account checked by the admin gate. Read-only for the pipeline.

use kernel::id::AdminId;
use platform::password::{ClearTextPassword, HashedPassword};

#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub id: AdminId,
    pub username: String,
    pub email: String,
    pub password_hash: HashedPassword,
}

impl AdminAccount {
    /// Whether `login` names this account, by username or by email.
    pub fn matches_login(&self, login: &str) -> bool {
        self.username == login || self.email == login
    }

    /// Argon2 verification; CPU-bound, run it off the async workers.
    pub fn verify_password(&self, password: &ClearTextPassword, pepper: Option<&[u8]>) -> bool {
        self.password_hash.verify(password, pepper)
    }
}
