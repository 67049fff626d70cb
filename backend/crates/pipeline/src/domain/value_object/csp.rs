//! Content Security Policy Value Objects
//!
//! The directive list is fixed for the process lifetime; only the nonce
//! changes per request.

use std::fmt;

use platform::crypto::{random_bytes, to_base64};

/// Random bytes behind each nonce (256 bits).
pub const NONCE_BYTES: usize = 32;

/// Directives that receive the per-request nonce token.
const NONCE_DIRECTIVES: [&str; 2] = ["script-src", "style-src"];

/// Per-request CSP nonce, base64 of [`NONCE_BYTES`] random bytes.
///
/// Inserted into request extensions so the rendering layer can put it on
/// inline `<script>`/`<style>` tags.
#[derive(Clone, PartialEq, Eq)]
pub struct CspNonce(String);

impl CspNonce {
    pub fn generate() -> Self {
        Self(to_base64(&random_bytes(NONCE_BYTES)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `'nonce-<value>'`
    pub fn source_token(&self) -> String {
        format!("'nonce-{}'", self.0)
    }
}

impl fmt::Debug for CspNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CspNonce").field(&self.0).finish()
    }
}

impl fmt::Display for CspNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directive name and its ordered source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspDirective {
    name: String,
    sources: Vec<String>,
}

impl CspDirective {
    pub fn new<I, S>(name: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn takes_nonce(&self) -> bool {
        NONCE_DIRECTIVES.contains(&self.name.as_str())
    }

    fn render(&self, nonce: &CspNonce) -> String {
        let mut rendered = self.name.clone();
        for source in &self.sources {
            rendered.push(' ');
            rendered.push_str(source);
        }
        if self.takes_nonce() {
            rendered.push(' ');
            rendered.push_str(&nonce.source_token());
        }
        rendered
    }
}

/// Ordered directive list plus an optional report URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspPolicy {
    directives: Vec<CspDirective>,
    report_uri: Option<String>,
}

impl Default for CspPolicy {
    fn default() -> Self {
        Self::new(vec![
            CspDirective::new("default-src", ["'self'"]),
            CspDirective::new("script-src", ["'self'"]),
            CspDirective::new("style-src", ["'self'"]),
            CspDirective::new("img-src", ["'self'", "data:"]),
            CspDirective::new("font-src", ["'self'"]),
            CspDirective::new("connect-src", ["'self'"]),
            CspDirective::new("frame-ancestors", ["'none'"]),
            CspDirective::new("base-uri", ["'self'"]),
            CspDirective::new("form-action", ["'self'"]),
        ])
    }
}

impl CspPolicy {
    pub fn new(directives: Vec<CspDirective>) -> Self {
        Self {
            directives,
            report_uri: None,
        }
    }

    pub fn with_report_uri(mut self, uri: impl Into<String>) -> Self {
        self.report_uri = Some(uri.into());
        self
    }

    pub fn directives(&self) -> &[CspDirective] {
        &self.directives
    }

    pub fn report_uri(&self) -> Option<&str> {
        self.report_uri.as_deref()
    }

    /// Header value for one response.
    ///
    /// `directive src src; directive src; ...`, with the nonce token
    /// appended to `script-src` and `style-src` only, and
    /// `; report-uri <uri>` at the end when configured.
    pub fn header_value(&self, nonce: &CspNonce) -> String {
        let mut value = self
            .directives
            .iter()
            .map(|d| d.render(nonce))
            .collect::<Vec<_>>()
            .join("; ");

        if let Some(uri) = &self.report_uri {
            value.push_str("; report-uri ");
            value.push_str(uri);
        }
        value
    }
}
