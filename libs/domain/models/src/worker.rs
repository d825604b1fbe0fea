// [libs/domain/models/src/worker.rs]
/*!
 * Worker registry entities: the other half of the dispatch contract.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Building,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub status: WorkerStatus,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub name: Option<String>,
    pub capabilities: Option<serde_json::Value>,
    pub builds_completed: i64,
    pub builds_failed: i64,
    pub current_build_id: Option<Uuid>,
}

/// Body of `POST /api/workers/register`. `active_build_count` is accepted
/// for logging only — it is never trusted as authoritative state.
/// `name`/`capabilities` are optional, free-form worker-supplied
/// metadata (fleet labels, supported platforms/toolchain versions); a
/// re-registration only overwrites them when supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerRegistration {
    pub id: Uuid,
    #[serde(default)]
    pub active_build_count: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRegistrationResponse {
    pub id: Uuid,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

/// Response shape for `GET /api/workers/poll`: a job envelope if one was
/// dispatched, plus the rotated token the worker must use on its next call.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPollResponse {
    pub build: Option<crate::build::BuildAssignment>,
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerUnregisterResponse {
    pub reassigned_build_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: Uuid,
    pub status: WorkerStatus,
    pub builds_completed: i64,
    pub builds_failed: i64,
    pub last_seen_at: DateTime<Utc>,
}

/// Body shared by the admin-initiated `/api/workers/heartbeat` and
/// `/api/workers/fail` endpoints: both act on behalf of a worker named by
/// id rather than by the worker's own token.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerIdBody {
    pub worker_id: Uuid,
}

/// Body of `POST /api/workers/fail`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerFailBody {
    pub worker_id: Uuid,
    #[serde(default)]
    pub error_message: Option<String>,
}
