//! Route path matching.
//!
//! # Responsibilities
//! - Match request paths against compiled route patterns
//! - Strip the matched prefix before forwarding
//! - Canonicalize request paths (`//`, `.` and `..` segments) before lookup
//!
//! # Design Decisions
//! - A path ending in `/` is a subtree pattern: `/api/` matches `/api/` and
//!   everything beneath it
//! - Any other path is exact: `/health` matches only `/health`
//! - Path matching is case-sensitive
//! - No regex, so matching is a plain string comparison per route
//! - Percent-encoded dots (`%2e`) count as dots when canonicalizing

use std::borrow::Cow;

/// A compiled route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches exactly this path.
    Exact(String),
    /// Matches this path and every path beneath it. Always ends in `/`.
    Subtree(String),
}

impl PathPattern {
    /// Compile a route path. Returns `None` for paths that can never match.
    pub fn parse(path: &str) -> Option<Self> {
        if !path.starts_with('/') {
            return None;
        }
        if path.ends_with('/') {
            Some(Self::Subtree(path.to_string()))
        } else {
            Some(Self::Exact(path.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Subtree(p) => p,
        }
    }

    /// Length used to order patterns; longer patterns are more specific.
    pub fn specificity(&self) -> usize {
        self.as_str().len()
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(p) => path == p,
            Self::Subtree(p) => path.starts_with(p.as_str()),
        }
    }

    /// The part of `path` after the pattern, or `None` if it doesn't match.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self {
            Self::Exact(p) => (path == p).then_some(""),
            Self::Subtree(p) => path.strip_prefix(p.as_str()),
        }
    }

    /// True if this is the subtree pattern for `path + "/"`.
    ///
    /// Used to redirect `/api` to `/api/` when only the subtree is routed.
    pub fn is_subtree_root_of(&self, path: &str) -> bool {
        match self {
            Self::Subtree(p) => p.len() == path.len() + 1 && p.starts_with(path),
            Self::Exact(_) => false,
        }
    }
}

/// Canonical form of a request path: duplicate slashes collapsed, `.`
/// dropped, `..` resolved against the previous segment and clamped at the
/// root. A trailing slash survives.
///
/// Borrows when `path` is already canonical, so callers can test for
/// `Cow::Owned` to detect a path that needs redirecting.
pub fn clean_path(path: &str) -> Cow<'_, str> {
    let canonical = path.starts_with('/')
        && !path.contains("//")
        && !path.split('/').any(|segment| dot_segment(segment).is_some());
    if canonical {
        return Cow::Borrowed(path);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match dot_segment(segment) {
            _ if segment.is_empty() => {}
            Some(Dot::Current) => {}
            Some(Dot::Parent) => {
                segments.pop();
            }
            None => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() || path.ends_with('/') {
        cleaned.push('/');
    }
    Cow::Owned(cleaned)
}

enum Dot {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<Dot> {
    let mut rest = segment.as_bytes();
    let mut dots = 0;
    while !rest.is_empty() {
        if rest[0] == b'.' {
            rest = &rest[1..];
        } else if rest.len() >= 3 && rest[..3].eq_ignore_ascii_case(b"%2e") {
            rest = &rest[3..];
        } else {
            return None;
        }
        dots += 1;
    }
    match dots {
        1 => Some(Dot::Current),
        2 => Some(Dot::Parent),
        _ => None,
    }
}
