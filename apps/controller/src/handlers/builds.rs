// [apps/controller/src/handlers/builds.rs]
/*!
 * =================================================================
 * APARATO: BUILD SUBMISSION & ARTIFACT I/O HANDLERS
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * =================================================================
 */

use crate::error::ApiError;
use crate::middleware::{verify_build_token, AdminKey, VmAuth, WorkerAuth};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use buildctl_domain_models::{
    AuthenticateRequest, AuthenticateResponse, BuildLogEntry, BuildRecord, BuildStatusCompat,
    BuildSubmissionResponse, Platform, TelemetryIngest,
};
use buildctl_infra_blobstore::Kind;
use chrono::{Duration, Utc};
use uuid::Uuid;

/// `POST /api/builds` (alias `/api/builds/submit`): multipart `platform`,
/// `source` file, optional `certs` file.
pub async fn submit(
    State(state): State<AppState>,
    _admin: AdminKey,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut platform: Option<Platform> = None;
    let mut source_bytes: Option<Vec<u8>> = None;
    let mut certs_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "platform" => {
                let text = field.text().await.map_err(|e| ApiError::Validation(e.to_string()))?;
                platform = Some(match text.as_str() {
                    "android" => Platform::Android,
                    "ios" => Platform::Ios,
                    other => return Err(ApiError::Validation(format!("unknown platform: {other}"))),
                });
            }
            "source" => {
                source_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::Validation(e.to_string()))?
                        .to_vec(),
                );
            }
            "certs" => {
                certs_bytes = Some(
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

    let platform = platform.ok_or_else(|| ApiError::Validation("missing platform".into()))?;
    let source_bytes =
        source_bytes.ok_or_else(|| ApiError::Validation("missing source artifact".into()))?;

    reject_if_queue_full(&state).await?;

    let access_token = buildctl_core_security::generate_token();
    let build = state.builds.create(platform, &access_token).await?;

    state
        .blobs
        .save(&build.id.to_string(), Kind::Source, std::io::Cursor::new(source_bytes))
        .await?;
    state
        .builds
        .set_source_path(build.id, &format!("{}/{}", build.id, Kind::Source.filename()))
        .await?;

    if let Some(certs) = certs_bytes {
        state
            .blobs
            .save(&build.id.to_string(), Kind::Certs, std::io::Cursor::new(certs))
            .await?;
        state
            .builds
            .set_certs_path(build.id, &format!("{}/{}", build.id, Kind::Certs.filename()))
            .await?;
    }

    state.logs.append(build.id, "build submitted").await?;
    state.dispatch.notify_pending(build.id).await;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(BuildSubmissionResponse {
            id: build.id,
            access_token,
        }),
    ))
}

/// Streams a blob back with a server-chosen `Content-Disposition` filename,
/// as required of every artifact download regardless of which caller/kind.
async fn stream_artifact(
    state: &AppState,
    build_id: Uuid,
    kind: Kind,
) -> Result<impl IntoResponse, ApiError> {
    let stream = state.blobs.read_stream(&build_id.to_string(), kind).await?;
    let filename = format!("{}-{}", kind.filename(), build_id);
    Ok((
        [(
            axum::http::header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        Body::from_stream(stream),
    ))
}

/// `GET /api/builds/:id/source` — worker-token auth, worker must own the
/// build it is downloading.
pub async fn download_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    WorkerAuth(worker): WorkerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if build.worker_id != Some(worker.id) {
        return Err(ApiError::Forbidden);
    }
    stream_artifact(&state, id, Kind::Source).await
}

/// `GET /api/builds/:id/certs` — same ownership rule as source.
pub async fn download_certs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    WorkerAuth(worker): WorkerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if build.worker_id != Some(worker.id) {
        return Err(ApiError::Forbidden);
    }
    stream_artifact(&state, id, Kind::Certs).await
}

/// `GET /api/builds/:id/download` — admin or the build's own submitter
/// token. Defaults to the `result` artifact.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    download_kind(&state, id, "result", &parts).await
}

/// `GET /api/builds/:id/download/:kind` — same auth as `download`, with an
/// explicit `kind` of `result` or `source`; anything else is a validation
/// error.
pub async fn download_typed(
    State(state): State<AppState>,
    Path((id, kind)): Path<(Uuid, String)>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    download_kind(&state, id, &kind, &parts).await
}

async fn download_kind(
    state: &AppState,
    id: Uuid,
    kind: &str,
    parts: &Parts,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if header_is_admin(parts, state).is_err() {
        verify_build_token(parts, &build.access_token)?;
    }

    let kind = match kind {
        "result" => Kind::Result,
        "source" => Kind::Source,
        other => return Err(ApiError::Validation(format!("unknown download type: {other}"))),
    };

    stream_artifact(state, id, kind).await
}

/// `POST /api/builds/:id/authenticate` — exchanges the submitter's build
/// token plus the one-time code for a short-lived VM token.
pub async fn authenticate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
    Json(body): Json<AuthenticateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    verify_build_token(&parts, &build.access_token)?;

    let vm_token = buildctl_core_security::generate_token();
    let expires_at = Utc::now() + Duration::seconds(state.config.vm_token_ttl_seconds);

    state
        .builds
        .authenticate(id, &body.otp, &vm_token, expires_at)
        .await?;

    Ok(Json(AuthenticateResponse { vm_token, expires_at }))
}

/// `GET /api/builds/:id/certs-secure` — VM-token scoped, returns the certs
/// payload base64-encoded inside a JSON envelope rather than as a raw
/// stream, since VM-side consumers expect a JSON response here.
pub async fn certs_secure(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    VmAuth { build_id }: VmAuth,
) -> Result<impl IntoResponse, ApiError> {
    if build_id != id {
        return Err(ApiError::Forbidden);
    }

    let bytes = read_all(&state, id, Kind::Certs).await?;
    Ok(Json(serde_json::json!({ "certs": BASE64.encode(bytes) })))
}

async fn read_all(state: &AppState, id: Uuid, kind: Kind) -> Result<Vec<u8>, ApiError> {
    use futures::StreamExt;
    let mut stream = Box::pin(state.blobs.read_stream(&id.to_string(), kind).await?);
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?);
    }
    Ok(out)
}

/// `GET /api/builds` — admin-only, every build regardless of status.
pub async fn list(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    let builds = state.builds.list_all().await?;
    let records: Vec<BuildRecord> = builds.iter().map(BuildRecord::from).collect();
    Ok(Json(records))
}

/// `GET /api/builds/:id` — admin or the build's own submitter token. Never
/// echoes `access_token`, `vm_token`, or `otp`.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if header_is_admin(&parts, &state).is_err() {
        verify_build_token(&parts, &build.access_token)?;
    }
    Ok(Json(BuildRecord::from(&build)))
}

/// `GET /api/builds/:id/status` — same auth as `get`, preserved back-compat
/// shape with millisecond-epoch timestamps for older callers.
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if header_is_admin(&parts, &state).is_err() {
        verify_build_token(&parts, &build.access_token)?;
    }
    Ok(Json(BuildStatusCompat::from(&build)))
}

/// `POST /api/builds/:id/heartbeat` — VM-token scoped. First call moves the
/// build from `assigned` to `building` and stamps `started_at`; every call
/// after just refreshes `last_heartbeat_at`.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    VmAuth { build_id }: VmAuth,
) -> Result<impl IntoResponse, ApiError> {
    if build_id != id {
        return Err(ApiError::Forbidden);
    }
    let build = state.builds.find(id).await?;
    let worker_id = build.worker_id.ok_or(ApiError::Conflict)?;
    state.builds.heartbeat(id, worker_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `POST /api/builds/:id/retry` — admin-only. Allocates a fresh build row
/// and a fresh copy of the original source (and certs, if present); the
/// original build is left untouched.
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    let original = state.builds.find(id).await?;

    if !state.blobs.exists(&id.to_string(), Kind::Source).await? {
        return Err(ApiError::Validation("original source artifact is gone".into()));
    }

    reject_if_queue_full(&state).await?;

    let access_token = buildctl_core_security::generate_token();
    let build = state.builds.create(original.platform, &access_token).await?;

    state
        .blobs
        .copy(&id.to_string(), &build.id.to_string(), Kind::Source)
        .await?;
    state
        .builds
        .set_source_path(build.id, &format!("{}/{}", build.id, Kind::Source.filename()))
        .await?;

    if state.blobs.exists(&id.to_string(), Kind::Certs).await? {
        state
            .blobs
            .copy(&id.to_string(), &build.id.to_string(), Kind::Certs)
            .await?;
        state
            .builds
            .set_certs_path(build.id, &format!("{}/{}", build.id, Kind::Certs.filename()))
            .await?;
    }

    state
        .logs
        .append(build.id, &format!("retry of build {id}"))
        .await?;
    state.dispatch.notify_pending(build.id).await;

    Ok(Json(BuildSubmissionResponse {
        id: build.id,
        access_token,
    }))
}

/// `POST /api/builds/:id/cancel` — admin-only, any non-terminal state.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    state.builds.cancel(id).await?;
    state.logs.append(id, "build cancelled by operator").await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `GET /api/builds/:id/logs` — admin or the build's own submitter token.
pub async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if header_is_admin(&parts, &state).is_err() {
        verify_build_token(&parts, &build.access_token)?;
    }
    let logs = state.logs.for_build(id).await?;
    Ok(Json(logs))
}

/// `POST /api/builds/:id/logs` — VM-token scoped append. A log line is
/// itself liveness signal: like the heartbeat endpoint, the first one moves
/// the build from `assigned` to `building`.
pub async fn post_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    VmAuth { build_id }: VmAuth,
    Json(entry): Json<BuildLogEntry>,
) -> Result<impl IntoResponse, ApiError> {
    if build_id != id {
        return Err(ApiError::Forbidden);
    }
    touch_build_liveness(&state, id).await?;
    state.logs.append(id, &entry.message).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Shared by `post_log`/`post_telemetry`: either stream is liveness signal
/// from the VM, same as the dedicated heartbeat endpoint.
async fn touch_build_liveness(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    let build = state.builds.find(id).await?;
    if let Some(worker_id) = build.worker_id {
        state.builds.heartbeat(id, worker_id).await?;
    }
    Ok(())
}

/// `GET /api/builds/:id/telemetry` — admin or submitter token.
pub async fn get_telemetry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let build = state.builds.find(id).await?;
    if header_is_admin(&parts, &state).is_err() {
        verify_build_token(&parts, &build.access_token)?;
    }
    let samples = state.telemetry.for_build(id).await?;
    Ok(Json(samples))
}

/// `POST /api/builds/:id/telemetry` — VM-token scoped ingest.
pub async fn post_telemetry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    VmAuth { build_id }: VmAuth,
    Json(sample): Json<TelemetryIngest>,
) -> Result<impl IntoResponse, ApiError> {
    if build_id != id {
        return Err(ApiError::Forbidden);
    }
    touch_build_liveness(&state, id).await?;
    state
        .telemetry
        .record(id, &sample.stage, sample.progress_percent)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// `GET /api/builds/active` — admin-only aggregate view.
pub async fn active(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.builds.list_active().await?))
}

/// `GET /api/builds/statistics` — admin-only aggregate counters.
pub async fn statistics(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.builds.statistics().await?))
}

/// Backpressure: once the dispatch queue is at or past its configured
/// high-water mark, new submissions are turned away with an advisory
/// retry-after rather than piling up work the worker fleet can't keep up
/// with.
async fn reject_if_queue_full(state: &AppState) -> Result<(), ApiError> {
    let depth = state.dispatch.pending_len().await?;
    if depth >= state.config.dispatch_queue_high_water_mark {
        return Err(ApiError::QueueFull { retry_after_seconds: 30 });
    }
    Ok(())
}

fn header_is_admin(parts: &Parts, state: &AppState) -> Result<(), ApiError> {
    let supplied = parts
        .headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if buildctl_core_security::secure_compare(supplied, &state.config.admin_api_key) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
