// [apps/controller/src/routes.rs]
/*!
 * =================================================================
 * APARATO: HTTP ROUTE COMPOSITION
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * =================================================================
 */

use crate::handlers::{admin, builds, workers};
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    let build_routes = Router::new()
        .route("/api/builds", get(builds::list).post(builds::submit))
        .route("/api/builds/submit", post(builds::submit))
        .route("/api/builds/active", get(builds::active))
        .route("/api/builds/statistics", get(builds::statistics))
        .route("/api/builds/:id", get(builds::get))
        .route("/api/builds/:id/status", get(builds::status))
        .route("/api/builds/:id/heartbeat", post(builds::heartbeat))
        .route("/api/builds/:id/download", get(builds::download))
        .route("/api/builds/:id/download/:kind", get(builds::download_typed))
        .route("/api/builds/:id/source", get(builds::download_source))
        .route("/api/builds/:id/certs", get(builds::download_certs))
        .route("/api/builds/:id/certs-secure", get(builds::certs_secure))
        .route("/api/builds/:id/authenticate", post(builds::authenticate))
        .route("/api/builds/:id/retry", post(builds::retry))
        .route("/api/builds/:id/cancel", post(builds::cancel))
        .route(
            "/api/builds/:id/logs",
            get(builds::get_logs).post(builds::post_log),
        )
        .route(
            "/api/builds/:id/telemetry",
            get(builds::get_telemetry).post(builds::post_telemetry),
        );

    let worker_routes = Router::new()
        .route("/api/workers/register", post(workers::register))
        .route("/api/workers/poll", get(workers::poll))
        .route("/api/workers/unregister", post(workers::unregister))
        .route("/api/workers/abandon", post(workers::abandon))
        .route("/api/workers/heartbeat", post(workers::admin_heartbeat))
        .route("/api/workers/fail", post(workers::admin_fail))
        .route("/api/workers/upload", post(workers::upload_result))
        .route("/api/workers/result", post(workers::upload_result))
        .route("/api/workers/:id/stats", get(workers::stats))
        .route("/api/workers", get(admin::list_workers));

    let public_routes = Router::new()
        .route("/health", get(admin::health))
        .route("/stats", get(admin::public_stats))
        .route("/public/stats", get(admin::public_stats));

    Router::new()
        .merge(public_routes)
        .merge(build_routes)
        .merge(worker_routes)
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
