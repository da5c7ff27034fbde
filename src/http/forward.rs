//! Upstream forwarding.
//!
//! # Responsibilities
//! - Perform the HTTP round-trip to an upstream, over TLS for `https://`
//! - Bound the wait for the upstream response head
//! - Map failures to gateway status codes
//!
//! # Design Decisions
//! - Response bodies are streamed, never buffered
//! - No retries: a failed forward is reported to the client once
//! - `Forward` is a trait so route tables can be exercised without sockets

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::schema::TimeoutConfig;
use crate::security::headers;

/// Why a request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream unreachable: {0}")]
    Unreachable(#[source] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Unreachable(_) | ForwardError::InvalidTarget(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match &self {
            ForwardError::Timeout(_) => "Upstream timed out",
            _ => "Upstream request failed",
        };
        (self.status(), message).into_response()
    }
}

/// The forwarding capability: send a request whose URI already points at
/// the upstream, and return the upstream's response.
pub trait Forward: Send + Sync {
    fn forward(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response, ForwardError>>;
}

/// Forwards over pooled HTTP/1.1 connections, plain or rustls-wrapped
/// depending on the upstream scheme.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    upstream_timeout: Duration,
}

impl HttpForwarder {
    pub fn new(config: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect()));
        connector.set_nodelay(true);
        // The TLS wrapper decides per URI; the inner connector must accept both.
        connector.enforce_http(false);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle())
            .build(connector);

        Self {
            client,
            upstream_timeout: config.upstream(),
        }
    }
}

impl Forward for HttpForwarder {
    fn forward(&self, mut request: Request<Body>) -> BoxFuture<'static, Result<Response, ForwardError>> {
        let client = self.client.clone();
        let upstream_timeout = self.upstream_timeout;

        async move {
            let peer = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip());
            headers::prepare_upstream_headers(request.headers_mut(), peer);
            // Pooled connections speak HTTP/1.1 regardless of the inbound version.
            *request.version_mut() = Version::HTTP_11;

            let response: Response<hyper::body::Incoming> =
                match tokio::time::timeout(upstream_timeout, client.request(request)).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(e)) => return Err(ForwardError::Unreachable(e)),
                    Err(_) => return Err(ForwardError::Timeout(upstream_timeout)),
                };

            let (mut parts, body) = response.into_parts();
            headers::strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, Body::new(body)))
        }
        .boxed()
    }
}
