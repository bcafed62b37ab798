//! Path segment utilities
//!
//! Pure helpers shared by registration and lookup. A pattern segment is
//! either a literal (`users`) or a parameter placeholder (`{id}`); the
//! distinction is decided once, at registration, by [`Segment::parse`].

use crate::InsertError;
use std::fmt;

/// A parsed pattern segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches exactly this text
    Literal(String),
    /// Captures any non-empty segment under this name
    Param(String),
}

impl Segment {
    /// Parse a raw pattern segment
    ///
    /// ```
    /// use fresh_router::Segment;
    ///
    /// assert_eq!(Segment::parse("users").unwrap(), Segment::Literal("users".into()));
    /// assert_eq!(Segment::parse("{id}").unwrap(), Segment::Param("id".into()));
    /// assert!(Segment::parse("{}").is_err());
    /// assert!(Segment::parse("a{b}").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, InsertError> {
        if raw.is_empty() {
            return Err(InsertError::EmptySegment);
        }
        if let Some(name) = param_name(raw) {
            if name.is_empty() || name.contains(['{', '}', '/']) {
                return Err(InsertError::InvalidSegment(raw.to_string()));
            }
            return Ok(Segment::Param(name.to_string()));
        }
        if raw.contains(['{', '}']) {
            return Err(InsertError::InvalidSegment(raw.to_string()));
        }
        Ok(Segment::Literal(raw.to_string()))
    }

    /// Literal text or parameter name
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Literal(s) | Segment::Param(s) => s,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Param(name) => write!(f, "{{{}}}", name),
        }
    }
}

/// Split a path into segments
///
/// Leading and trailing slashes are stripped, so `/`, `""` and `//` all
/// yield no segments. Interior empty segments are kept: `/a//b` is
/// `["a", "", "b"]`.
///
/// ```
/// use fresh_router::path::split;
///
/// assert_eq!(split("/users/42/"), vec!["users", "42"]);
/// assert!(split("/").is_empty());
/// ```
pub fn split(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').collect()
}

/// Check whether a raw segment is a `{name}` placeholder
#[inline]
pub fn is_param(segment: &str) -> bool {
    param_name(segment).is_some()
}

/// Extract `name` from a `{name}` placeholder
#[inline]
pub fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// Join a prefix and a relative path into a normalized `/a/b` path
///
/// ```
/// use fresh_router::path::join;
///
/// assert_eq!(join("/todos/", "/{id}"), "/todos/{id}");
/// assert_eq!(join("/todos", "/"), "/todos");
/// assert_eq!(join("/", ""), "/");
/// ```
pub fn join(prefix: &str, path: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + path.len() + 1);
    for segment in split(prefix).into_iter().chain(split(path)) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
