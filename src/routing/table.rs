//! Route table compilation and dispatch.
//!
//! # Responsibilities
//! - Compile declarative routes into bound handlers
//! - Redirect non-canonical request paths to their cleaned form
//! - Look up the most specific route for a request path
//! - Return an explicit 404 (or subtree redirect) on no match
//!
//! # Design Decisions
//! - Immutable after construction; a config change builds a new table
//! - Malformed entries are skipped and logged, never fatal to the compile
//! - Duplicate paths: the first registration wins
//! - Entries sorted by specificity so the first match is the longest match

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;

use crate::config::schema::Route;
use crate::http::forward::{Forward, ForwardError};
use crate::routing::handler::{BoxHandler, Handler, HandlerFuture};
use crate::routing::matcher::{clean_path, PathPattern};
use crate::routing::upstream::Upstream;
use crate::security::rate_limit::{AdmissionController, Admitted};

/// Builds route tables. Holds the collaborators every compiled route shares.
#[derive(Clone)]
pub struct RouteCompiler {
    admission: Option<Arc<AdmissionController>>,
    forwarder: Arc<dyn Forward>,
}

impl RouteCompiler {
    /// `admission` of `None` compiles routes without rate limiting.
    pub fn new(admission: Option<Arc<AdmissionController>>, forwarder: Arc<dyn Forward>) -> Self {
        Self { admission, forwarder }
    }

    pub fn compile(&self, routes: &[Route]) -> RouteTable {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(routes.len());
        let mut skipped = 0;

        for route in routes {
            let Some(pattern) = PathPattern::parse(&route.path) else {
                tracing::error!(path = %route.path, "Invalid route path, skipping");
                skipped += 1;
                continue;
            };

            let upstream = match Upstream::parse(&route.upstream) {
                Ok(upstream) => upstream,
                Err(e) => {
                    tracing::error!(path = %route.path, upstream = %route.upstream, error = %e, "Invalid upstream, skipping route");
                    skipped += 1;
                    continue;
                }
            };

            if !seen.insert(route.path.as_str()) {
                tracing::warn!(path = %route.path, upstream = %route.upstream, "Duplicate route path, keeping first registration");
                skipped += 1;
                continue;
            }

            let proxy = ProxyTo {
                pattern: pattern.clone(),
                upstream,
                forwarder: Arc::clone(&self.forwarder),
            };
            let handler: BoxHandler = match &self.admission {
                Some(controller) => Arc::new(Admitted::new(Arc::clone(controller), proxy)),
                None => Arc::new(proxy),
            };

            tracing::debug!(path = %route.path, upstream = %route.upstream, "Route compiled");
            entries.push(RouteEntry {
                route: route.clone(),
                pattern,
                handler,
            });
        }

        // Stable sort keeps registration order among equally specific routes.
        entries.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));

        RouteTable { entries, skipped }
    }
}

/// A compiled route.
pub struct RouteEntry {
    route: Route,
    pattern: PathPattern,
    handler: BoxHandler,
}

impl RouteEntry {
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }
}

/// An immutable, compiled set of routes.
#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    skipped: usize,
}

impl RouteTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of source entries rejected during compilation.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// The compiled routes, most specific first.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.entries.iter().map(|entry| &entry.route)
    }

    /// The most specific entry matching `path`.
    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|entry| entry.pattern.matches(path))
    }

    /// Handle a request against this table.
    ///
    /// Takes `Arc<Self>` so the returned future keeps this exact table alive
    /// for the whole request, however many swaps happen meanwhile.
    pub async fn dispatch(self: Arc<Self>, request: Request<Body>) -> Response {
        let path = request.uri().path();

        // Dot segments would otherwise match a route the cleaned path does not.
        if let Cow::Owned(cleaned) = clean_path(path) {
            tracing::debug!(path = %path, cleaned = %cleaned, "Redirecting to canonical path");
            return redirect(&cleaned, request.uri().query());
        }

        let future = match self.resolve(path) {
            Some(entry) => entry.handler.handle(request),
            None => return self.no_match(&request),
        };
        future.await
    }

    fn no_match(&self, request: &Request<Body>) -> Response {
        let path = request.uri().path();

        if self.entries.iter().any(|entry| entry.pattern.is_subtree_root_of(path)) {
            return redirect(&format!("{path}/"), request.uri().query());
        }

        tracing::warn!(path = %path, "No route matched");
        (StatusCode::NOT_FOUND, "Route not found").into_response()
    }
}

fn redirect(path: &str, query: Option<&str>) -> Response {
    let location = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

/// Innermost route handler: strip the route prefix and forward upstream.
struct ProxyTo {
    pattern: PathPattern,
    upstream: Upstream,
    forwarder: Arc<dyn Forward>,
}

impl Handler for ProxyTo {
    fn handle(&self, mut request: Request<Body>) -> HandlerFuture {
        let uri = request.uri();
        let rest = self.pattern.strip(uri.path()).unwrap_or_default();

        let target = match self.upstream.target(rest, uri.query()) {
            Ok(target) => target,
            Err(e) => {
                tracing::error!(path = %uri.path(), upstream = %self.upstream.origin(), error = %e, "Failed to build upstream URI");
                let error = ForwardError::InvalidTarget(e.to_string());
                return async move { error.into_response() }.boxed();
            }
        };

        tracing::debug!(path = %uri.path(), target = %target, "Proxying request");
        *request.uri_mut() = target;

        let forwarding = self.forwarder.forward(request);
        async move {
            match forwarding.await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "Upstream error");
                    e.into_response()
                }
            }
        }
        .boxed()
    }
}
