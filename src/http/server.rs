//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that hands every request to the RouterManager
//! - Wire up middleware (request ID, tracing, metrics)
//! - Serve with peer addresses attached for admission control
//! - Drain in-flight requests on shutdown, bounded by a deadline

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::routing::manager::RouterManager;

/// The data-plane listener.
pub struct HttpServer {
    router: Router,
    drain: Duration,
}

impl HttpServer {
    pub fn new(manager: Arc<RouterManager>, drain: Duration) -> Self {
        Self {
            router: Self::build_router(manager),
            drain,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(manager: Arc<RouterManager>) -> Router {
        Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(manager)
            .layer(middleware::from_fn(metrics::track_requests))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The router, for driving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain for at most the configured
    /// deadline before giving up on stragglers.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result,
            _ = stop.recv() => {}
        }

        tracing::info!(deadline = ?self.drain, "Draining in-flight requests");
        match tokio::time::timeout(self.drain, &mut serve).await {
            Ok(result) => {
                tracing::info!("HTTP server stopped");
                result
            }
            Err(_) => {
                tracing::warn!(deadline = ?self.drain, "Drain deadline exceeded, closing remaining connections");
                Ok(())
            }
        }
    }
}

async fn dispatch(State(manager): State<Arc<RouterManager>>, request: Request<Body>) -> Response {
    manager.dispatch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Route;
    use crate::http::forward::{Forward, ForwardError};
    use crate::routing::table::{RouteCompiler, RouteTable};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use tower::ServiceExt;

    struct Echo;

    impl Forward for Echo {
        fn forward(&self, request: Request<Body>) -> BoxFuture<'static, Result<Response, ForwardError>> {
            let target = request.uri().to_string();
            async move { Ok(target.into_response()) }.boxed()
        }
    }

    fn server(routes: &[Route]) -> HttpServer {
        let table = RouteCompiler::new(None, Arc::new(Echo)).compile(routes);
        HttpServer::new(Arc::new(RouterManager::new(table)), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_requests_reach_route_table() {
        let app = server(&[Route::new("/a/", "http://upstream-a")]).router();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/a/x?y=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"http://upstream-a/x?y=1");

        let response = app
            .oneshot(Request::builder().uri("/c/x").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_path_is_dispatched() {
        let app = server(&[Route::new("/", "http://fallback")]).router();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"http://fallback/");
    }

    #[tokio::test]
    async fn test_caller_request_id_is_propagated() {
        let app = HttpServer::new(Arc::new(RouterManager::new(RouteTable::empty())), Duration::from_secs(1)).router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/nothing")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(server(&[]).run(listener, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
