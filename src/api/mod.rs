pub mod dto;
pub mod errors;
pub mod handlers;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::state::AppState;
use handlers::ApiDoc;

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/maquinaria",
            get(handlers::list_machines).post(handlers::create_machine),
        )
        .route(
            "/maquinaria/{id}",
            get(handlers::get_machine)
                .put(handlers::update_machine)
                .delete(handlers::delete_machine),
        )
        .route("/lecturas", post(handlers::create_reading))
        .route("/lecturas/batch", post(handlers::create_readings_batch))
        .route("/lecturas/latest", get(handlers::latest_readings))
        .route("/lecturas/maquina/{id}", get(handlers::machine_readings))
        .route("/lecturas/resumen", get(handlers::summary))
        .route("/seed/historico", post(handlers::seed_history))
        .route("/sim/start", post(handlers::sim_start))
        .route("/sim/stop", post(handlers::sim_stop))
        .route("/sim/status", get(handlers::sim_status))
        .with_state(state)
        .split_for_parts();

    router
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}

/// CORS layer for the dashboard. A single `*` entry allows any origin.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {o}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(layer.allow_origin(origins))
}
