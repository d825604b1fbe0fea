// [apps/controller/src/handlers/workers.rs]
/*!
 * =================================================================
 * APARATO: WORKER REGISTRY & TOKEN SERVICE HANDLERS
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * =================================================================
 */

use crate::error::ApiError;
use crate::middleware::{AdminKey, WorkerAuth, WorkerIdentity};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use buildctl_domain_models::{
    WorkerFailBody, WorkerIdBody, WorkerPollResponse, WorkerRegistration,
    WorkerRegistrationResponse, WorkerStats, WorkerUnregisterResponse,
};
use buildctl_infra_blobstore::Kind;
use uuid::Uuid;

/// `POST /api/workers/register` — admin key. New id mints a fresh token;
/// re-registration of a known id rotates the token without disturbing
/// status or any build the worker currently owns.
pub async fn register(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<WorkerRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(count) = body.active_build_count {
        tracing::info!(worker_id = %body.id, claimed_active_builds = count, "worker registration");
    }

    let worker = state
        .workers
        .register(
            body.id,
            state.config.worker_token_ttl_seconds,
            body.name.as_deref(),
            body.capabilities.as_ref(),
        )
        .await?;

    Ok(Json(WorkerRegistrationResponse {
        id: worker.id,
        access_token: worker.access_token,
        access_token_expires_at: worker.access_token_expires_at,
    }))
}

/// `GET /api/workers/poll` — `X-Worker-Token` auth, or the legacy
/// `X-Worker-Id` + admin key pairing for pollers that predate per-worker
/// tokens. Rotates the token, then runs dispatch. The pre-rotation token
/// supplied on this request stays valid for the remainder of the request
/// even though a fresh one is minted and returned.
pub async fn poll(
    State(state): State<AppState>,
    identity: WorkerIdentity,
) -> Result<impl IntoResponse, ApiError> {
    let worker = identity.into_worker();
    let rotated = state
        .workers
        .heartbeat_and_rotate(worker.id, state.config.worker_token_ttl_seconds)
        .await?;

    let assignment = state.dispatch.next_for_worker(worker.id).await?;

    let build = assignment.map(|b| buildctl_domain_models::BuildAssignment {
        id: b.id,
        platform: b.platform,
        access_token: b.access_token,
        otp: b.otp.unwrap_or_default(),
        otp_expires_at: b.otp_expires_at.unwrap_or_else(chrono::Utc::now),
    });

    Ok(Json(WorkerPollResponse {
        build,
        access_token: rotated.access_token,
        access_token_expires_at: rotated.access_token_expires_at,
    }))
}

/// `POST /api/workers/unregister` — reassigns every in-flight build the
/// worker owns back to `pending`, marks the worker `offline`.
pub async fn unregister(
    State(state): State<AppState>,
    WorkerAuth(worker): WorkerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let owned: Vec<Uuid> = state
        .builds
        .list_active()
        .await?
        .into_iter()
        .filter(|b| b.worker_id == Some(worker.id))
        .map(|b| b.id)
        .collect();

    let reassigned = state.builds.reassign_all_for_worker(worker.id).await?;
    for build_id in owned {
        state.dispatch.notify_pending(build_id).await;
    }
    state.workers.mark_offline(worker.id).await?;

    Ok(Json(WorkerUnregisterResponse {
        reassigned_build_count: reassigned,
    }))
}

/// `POST /api/workers/upload` (alias `/api/workers/result`) — multipart
/// `build_id`, `success`, optional `result` file / `error_message`.
/// Success path saves the artifact, marks the build completed, and frees
/// the worker in one transaction; failure path is state-only.
pub async fn upload_result(
    State(state): State<AppState>,
    WorkerAuth(worker): WorkerAuth,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut build_id: Option<Uuid> = None;
    let mut success: Option<bool> = None;
    let mut error_message: Option<String> = None;
    let mut result_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "build_id" => {
                let text = field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?;
                build_id = Some(
                    Uuid::parse_str(&text).map_err(|e| ApiError::Validation(e.to_string()))?,
                );
            }
            "success" => {
                let text = field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?;
                success = Some(
                    text.parse::<bool>()
                        .map_err(|_| ApiError::Validation("success must be a boolean".into()))?,
                );
            }
            "error_message" => {
                error_message = Some(field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?);
            }
            "result" => {
                result_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let build_id = build_id.ok_or_else(|| ApiError::Validation("missing build_id".into()))?;
    let success = success.ok_or_else(|| ApiError::Validation("missing success".into()))?;

    let build = state.builds.find(build_id).await?;
    if build.worker_id != Some(worker.id) {
        return Err(ApiError::Forbidden);
    }

    let mut result_path = None;
    if success {
        if let Some(bytes) = result_bytes {
            state
                .blobs
                .save(&build_id.to_string(), Kind::Result, std::io::Cursor::new(bytes))
                .await?;
            result_path = Some(format!("{}/{}", build_id, Kind::Result.filename()));
        }
    }

    state
        .builds
        .finish(build_id, worker.id, success, error_message.as_deref(), result_path.as_deref())
        .await?;

    if success {
        state.workers.increment_completed(worker.id).await?;
        state.logs.append(build_id, "build completed").await?;
    } else {
        state.workers.increment_failed(worker.id).await?;
        let reason = error_message.as_deref().unwrap_or("worker reported failure");
        state
            .logs
            .append(build_id, &format!("build failed: {reason}"))
            .await?;
    }

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `GET /api/workers/:id/stats` — admin-only.
pub async fn stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.workers.find(id).await?;
    Ok(Json(WorkerStats {
        id: worker.id,
        status: worker.status,
        builds_completed: worker.builds_completed,
        builds_failed: worker.builds_failed,
        last_seen_at: worker.last_seen_at,
    }))
}

/// `POST /api/workers/abandon` — worker token. Reassigns whatever build
/// the caller currently holds back to `pending` and frees the worker to
/// `idle`, without taking it offline — distinct from `unregister`, the
/// clean-shutdown path, which marks the worker offline outright.
pub async fn abandon(
    State(state): State<AppState>,
    WorkerAuth(worker): WorkerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let Some(build_id) = worker.current_build_id else {
        return Ok(Json(WorkerUnregisterResponse { reassigned_build_count: 0 }));
    };

    let reassigned = state.builds.reassign_all_for_worker(worker.id).await?;
    state.workers.free_if_holding(worker.id, build_id).await?;
    state.dispatch.notify_pending(build_id).await;

    Ok(Json(WorkerUnregisterResponse { reassigned_build_count: reassigned }))
}

/// `POST /api/workers/heartbeat` — admin-initiated liveness touch on behalf
/// of a worker id, for operator tooling that nudges a worker's
/// `last_seen_at` without going through its own poll loop.
pub async fn admin_heartbeat(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<WorkerIdBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.workers.touch_last_seen(body.worker_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `POST /api/workers/fail` — admin-initiated failure of whatever build the
/// named worker currently holds. Same downstream effect as the worker
/// reporting failure through `/workers/upload` itself.
pub async fn admin_fail(
    State(state): State<AppState>,
    _admin: AdminKey,
    Json(body): Json<WorkerFailBody>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.workers.find(body.worker_id).await?;
    let build_id = worker.current_build_id.ok_or(ApiError::Conflict)?;

    state
        .builds
        .finish(build_id, worker.id, false, body.error_message.as_deref(), None)
        .await?;
    state.workers.increment_failed(worker.id).await?;

    let reason = body.error_message.as_deref().unwrap_or("no reason given");
    state
        .logs
        .append(build_id, &format!("build failed by operator: {reason}"))
        .await?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}
