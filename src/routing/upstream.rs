//! Upstream base URLs and request target rewriting.

use axum::http::Uri;
use url::{Position, Url};

/// Why an upstream URL was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid upstream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported upstream scheme `{0}` (expected http or https)")]
    UnsupportedScheme(String),

    #[error("upstream URL has no host")]
    MissingHost,
}

/// A validated upstream base URL, pre-split for cheap per-request rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// `scheme://host:port`
    origin: String,
    /// Base path, at least `/`.
    base_path: String,
    base_query: Option<String>,
}

impl Upstream {
    pub fn parse(raw: &str) -> Result<Self, UpstreamError> {
        let url = Url::parse(raw)?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(UpstreamError::UnsupportedScheme(url.scheme().to_string()));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(UpstreamError::MissingHost);
        }

        Ok(Self {
            origin: url[..Position::AfterPort].to_string(),
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Build the absolute URI for a request whose route prefix has already
    /// been stripped to `rest`.
    pub fn target(&self, rest: &str, query: Option<&str>) -> Result<Uri, axum::http::uri::InvalidUri> {
        let mut target = String::with_capacity(
            self.origin.len() + self.base_path.len() + rest.len() + query.map_or(0, str::len) + 2,
        );
        target.push_str(&self.origin);
        target.push_str(&join_paths(&self.base_path, rest));

        let query = query.filter(|q| !q.is_empty());
        match (self.base_query.as_deref(), query) {
            (Some(base), Some(extra)) => {
                target.push('?');
                target.push_str(base);
                target.push('&');
                target.push_str(extra);
            }
            (Some(q), None) | (None, Some(q)) => {
                target.push('?');
                target.push_str(q);
            }
            (None, None) => {}
        }

        target.parse()
    }
}

/// Join two path fragments with exactly one slash between them.
fn join_paths(base: &str, rest: &str) -> String {
    if rest.is_empty() {
        return base.to_string();
    }
    match (base.ends_with('/'), rest.starts_with('/')) {
        (true, true) => format!("{}{}", base, &rest[1..]),
        (false, false) => format!("{base}/{rest}"),
        _ => format!("{base}{rest}"),
    }
}
