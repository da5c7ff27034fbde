use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::config::loader::{load_config, save_config, ConfigError};
use crate::config::reload::ReloadSummary;
use crate::config::schema::Route;
use crate::routing::matcher::PathPattern;
use crate::routing::upstream::Upstream;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    BadRequest(String),

    #[error("route `{0}` already exists")]
    Conflict(String),

    #[error("route `{0}` not found")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::Conflict(_) => StatusCode::CONFLICT,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub generation: u64,
    pub routes: usize,
    pub skipped: usize,
    pub clients: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRoute {
    pub path: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let table = state.manager.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: state.manager.generation(),
        routes: table.len(),
        skipped: table.skipped(),
        clients: state.admission.as_ref().map_or(0, |a| a.client_count()),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<Route>> {
    Json(state.manager.current().routes().cloned().collect())
}

pub async fn add_route(
    State(state): State<AdminState>,
    Json(route): Json<Route>,
) -> Result<(StatusCode, Json<ReloadSummary>), AdminError> {
    if PathPattern::parse(&route.path).is_none() {
        return Err(AdminError::BadRequest(format!(
            "path `{}` must start with `/`",
            route.path
        )));
    }
    Upstream::parse(&route.upstream).map_err(|e| AdminError::BadRequest(e.to_string()))?;

    tracing::info!(path = %route.path, upstream = %route.upstream, "Adding route via admin API");
    let summary = edit_routes(&state, move |routes| {
        if routes.iter().any(|r| r.path == route.path) {
            return Err(AdminError::Conflict(route.path));
        }
        routes.push(route);
        Ok(())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn remove_route(
    State(state): State<AdminState>,
    Query(RemoveRoute { path }): Query<RemoveRoute>,
) -> Result<Json<ReloadSummary>, AdminError> {
    tracing::info!(path = %path, "Removing route via admin API");
    let summary = edit_routes(&state, move |routes| {
        let before = routes.len();
        routes.retain(|r| r.path != path);
        if routes.len() == before {
            return Err(AdminError::NotFound(path));
        }
        Ok(())
    })
    .await?;
    Ok(Json(summary))
}

pub async fn reload(State(state): State<AdminState>) -> Result<Json<ReloadSummary>, AdminError> {
    let reloader = Arc::clone(&state.reloader);
    let summary = tokio::task::spawn_blocking(move || reloader.reload())
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))??;
    Ok(Json(summary))
}

/// Apply `edit` to the routes in the config file, write it back and reload.
///
/// Edits are serialized so two concurrent requests cannot lose each other's
/// changes.
async fn edit_routes<F>(state: &AdminState, edit: F) -> Result<ReloadSummary, AdminError>
where
    F: FnOnce(&mut Vec<Route>) -> Result<(), AdminError> + Send + 'static,
{
    let _guard = state.edits.lock().await;
    let reloader = Arc::clone(&state.reloader);

    tokio::task::spawn_blocking(move || -> Result<ReloadSummary, AdminError> {
        let path = reloader.path();
        let mut config = load_config(path)?;
        edit(&mut config.routes)?;
        save_config(path, &config)?;
        Ok(reloader.reload()?)
    })
    .await
    .map_err(|e| AdminError::Internal(e.to_string()))?
}
