mod v1;

use axum::{Router, routing::get};
use utoipa_axum::router::OpenApiRouter;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest("/v1", v1::routes(config))
}

/// Signed downloads for the filesystem storage backend. Not part of the API docs.
pub fn file_routes() -> Router<AppState> {
    Router::new().route("/files/{bucket}/{key}", get(handlers::files::download))
}
