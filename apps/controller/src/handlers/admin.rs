// [apps/controller/src/handlers/admin.rs]
/*!
 * =================================================================
 * APARATO: PUBLIC & ADMINISTRATIVE SURFACES
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * =================================================================
 */

use crate::error::ApiError;
use crate::middleware::AdminKey;
use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// `GET /health` — unauthenticated liveness probe. Touches the pool with a
/// trivial query so a wedged database shows up here rather than only on the
/// first real request.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.builds.statistics().await {
        Ok(_) => (axum::http::StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(_) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded" })),
        ),
    }
}

/// `GET /stats` / `GET /public/stats` — unauthenticated aggregate counters,
/// safe to expose without a credential since they carry no per-build or
/// per-worker identifying detail.
pub async fn public_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let builds = state.builds.statistics().await?;
    let workers = state.workers.list().await?;
    let idle = workers.iter().filter(|w| matches!(w.status, buildctl_domain_models::WorkerStatus::Idle)).count();
    let building = workers.iter().filter(|w| matches!(w.status, buildctl_domain_models::WorkerStatus::Building)).count();

    Ok(Json(json!({
        "builds": builds,
        "workers": {
            "total": workers.len(),
            "idle": idle,
            "building": building,
        },
    })))
}

/// `GET /api/workers` — admin-only roster of every registered worker.
pub async fn list_workers(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.workers.list().await?))
}
