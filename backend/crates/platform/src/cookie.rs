//! Cookie helpers
//!
//! Sessions are issued elsewhere; the pipeline only reads the session id.

use axum::http::{HeaderMap, header};

/// Extract a cookie value from headers.
///
/// Every `Cookie` header is scanned; the first pair named `name` wins.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;

            if key == name && !value.is_empty() {
                Some(value.to_string())
            } else {
                None
            }
        })
}
