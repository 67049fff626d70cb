//! HTTP Basic credential parsing

use axum::http::{HeaderMap, header};
use platform::crypto::from_base64;
use platform::password::ClearTextPassword;

use crate::error::AdminAuthError;

#[derive(Debug)]
pub struct BasicCredentials {
    pub username: String,
    pub password: ClearTextPassword,
}

impl BasicCredentials {
    /// Parse `Authorization: Basic base64(user:password)`.
    ///
    /// An absent header or an empty username/password is
    /// `MissingCredentials`; anything undecodable is `MalformedCredentials`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AdminAuthError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(AdminAuthError::MissingCredentials)?
            .to_str()
            .map_err(|_| AdminAuthError::MalformedCredentials)?;

        let (scheme, encoded) = value
            .trim()
            .split_once(' ')
            .ok_or(AdminAuthError::MalformedCredentials)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AdminAuthError::MissingCredentials);
        }

        let decoded = from_base64(encoded.trim()).map_err(|_| AdminAuthError::MalformedCredentials)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AdminAuthError::MalformedCredentials)?;

        // The password may itself contain ':'
        let (username, password) = decoded
            .split_once(':')
            .ok_or(AdminAuthError::MalformedCredentials)?;

        if username.is_empty() || password.is_empty() {
            return Err(AdminAuthError::MissingCredentials);
        }

        Ok(Self {
            username: username.to_string(),
            password: ClearTextPassword::new(password),
        })
    }
}
