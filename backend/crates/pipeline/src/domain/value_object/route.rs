//! Route Value Objects
//!
//! - [`PathPrefix`]: segment-aware prefix match (admin area, diagnostics, API)
//! - [`RouteTable`]: maps `(method, path)` to a route name such as
//!   `threads.show`, so policies can reason about names instead of URLs
//!
//! Matching is literal and case-sensitive; `{param}` segments match any
//! single non-empty segment. No regex.

use axum::http::Method;

/// Path prefix matched on whole segments.
///
/// `PathPrefix::new("telescope")` matches `/telescope` and
/// `/telescope/requests` but not `/telescopes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefix {
    /// Normalized: leading `/`, no trailing `/`
    prefix: String,
}

impl PathPrefix {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let trimmed = prefix.as_ref().trim_matches('/');
        Self {
            prefix: format!("/{}", trimmed),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        // "/" as a prefix matches everything
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct RouteEntry {
    method: Method,
    segments: Vec<Segment>,
    name: String,
}

impl RouteEntry {
    fn matches(&self, method: &Method, segments: &[&str]) -> bool {
        let method_matches =
            self.method == method || (self.method == Method::GET && method == Method::HEAD);

        method_matches
            && self.segments.len() == segments.len()
            && self
                .segments
                .iter()
                .zip(segments)
                .all(|(expected, actual)| match expected {
                    Segment::Literal(literal) => literal == actual,
                    Segment::Param => !actual.is_empty(),
                })
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Named routes, first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. `HEAD` requests also resolve `GET` routes.
    pub fn route(mut self, method: Method, pattern: &str, name: impl Into<String>) -> Self {
        let segments = split_path(pattern)
            .into_iter()
            .map(|segment| {
                if segment.starts_with('{') && segment.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        self.routes.push(RouteEntry {
            method,
            segments,
            name: name.into(),
        });
        self
    }

    pub fn resolve(&self, method: &Method, path: &str) -> Option<&str> {
        let segments = split_path(path);
        self.routes
            .iter()
            .find(|route| route.matches(method, &segments))
            .map(|route| route.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
