//! Admin API for inspecting and editing routes at runtime.
//!
//! Served on its own listener so it can be bound to loopback while the data
//! plane listens publicly. Route edits are written to the config file and
//! then reloaded, so the file stays the source of truth.
//!
//! CORS is answered ahead of authentication: browser preflights carry no
//! credentials.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::reload::Reloader;
use crate::lifecycle::shutdown::Shutdown;
use crate::routing::manager::RouterManager;
use crate::security::rate_limit::AdmissionController;

use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub manager: Arc<RouterManager>,
    pub reloader: Arc<Reloader>,
    pub admission: Option<Arc<AdmissionController>>,
    pub api_key: Arc<str>,
    pub edits: Arc<Mutex<()>>,
}

impl AdminState {
    pub fn new(
        reloader: Arc<Reloader>,
        admission: Option<Arc<AdmissionController>>,
        api_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            manager: Arc::clone(reloader.manager()),
            reloader,
            admission,
            api_key: api_key.into(),
            edits: Arc::new(Mutex::new(())),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes).post(add_route).delete(remove_route))
        .route("/admin/reload", post(reload))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Serve the admin API until shutdown.
pub async fn serve(listener: TcpListener, state: AdminState, shutdown: Shutdown) -> std::io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown.signalled())
        .await
}
