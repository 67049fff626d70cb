//! Pipeline Error Types
//!
//! Each failure the pipeline can meet has its own narrow type, so the
//! best-effort paths discard exactly the errors they mean to and nothing
//! else.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Realm advertised by the admin Basic-Auth challenge.
pub const ADMIN_REALM: &str = "Admin Area";

pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of a repository port.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Run the result of a storage call through the best-effort policy:
/// a [`StorageError`] is logged at `warn` and discarded.
///
/// Only `StorageError` is accepted, so programming errors elsewhere are
/// never swallowed here.
pub fn best_effort<T>(operation: &'static str, result: StorageResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "Best-effort storage operation failed");
            None
        }
    }
}

/// Failure to deliver a record to the external log sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("External log transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("External log sink rejected the record with status {0}")]
    Rejected(u16),
}

/// Admin gate failures. Every variant renders the same 401 challenge.
#[derive(Debug, Error)]
pub enum AdminAuthError {
    #[error("Basic credentials missing")]
    MissingCredentials,

    #[error("Basic credentials malformed")]
    MalformedCredentials,

    #[error("No admin account matches the login")]
    UnknownAccount,

    #[error("Admin password did not verify")]
    InvalidPassword,

    #[error("Password verification task failed")]
    VerifierUnavailable,

    #[error("Admin lookup failed: {0}")]
    Storage(#[from] StorageError),
}

impl AdminAuthError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Unauthorized
    }

    fn log(&self) {
        match self {
            AdminAuthError::Storage(e) => {
                tracing::error!(error = %e, "Admin account lookup failed, denying access");
            }
            AdminAuthError::VerifierUnavailable => {
                tracing::error!("Admin password verification task failed, denying access");
            }
            AdminAuthError::UnknownAccount | AdminAuthError::InvalidPassword => {
                tracing::warn!(reason = %self, "Admin authentication failed");
            }
            AdminAuthError::MissingCredentials | AdminAuthError::MalformedCredentials => {
                tracing::debug!(reason = %self, "Admin credentials not supplied");
            }
        }
    }
}

impl From<AdminAuthError> for AppError {
    fn from(err: AdminAuthError) -> Self {
        AppError::new(err.kind(), "Unauthorized")
    }
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        self.log();
        (
            self.status_code(),
            [(
                header::WWW_AUTHENTICATE,
                format!("Basic realm=\"{}\"", ADMIN_REALM),
            )],
            "Unauthorized",
        )
            .into_response()
    }
}

/// Invalid environment value at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}
