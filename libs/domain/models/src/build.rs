// [libs/domain/models/src/build.rs]
/*!
 * =================================================================
 * APARATO: BUILD DOMAIN MODELS
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATOS SOBERANOS DEL CICLO DE VIDA DE UN BUILD
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target platform a submitted build is compiled for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

/// Lifecycle status of a build: pending -> assigned -> building ->
/// completed|failed, with cancel reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Assigned,
    Building,
    Completed,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A single build job: the unit of work dispatched to exactly one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub platform: Platform,
    pub status: BuildStatus,
    pub access_token: String,
    pub worker_id: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub source_path: Option<String>,
    pub certs_path: Option<String>,
    pub result_path: Option<String>,
    pub vm_token: Option<String>,
    pub vm_token_expires_at: Option<DateTime<Utc>>,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
}

/// Redacted, full-record view of a build for `GET /api/builds` and
/// `GET /api/builds/:id` — credential fields (`access_token`, `vm_token`,
/// `otp`) never leave the repository layer through this shape.
#[derive(Debug, Clone, Serialize)]
pub struct BuildRecord {
    pub id: Uuid,
    pub platform: Platform,
    pub status: BuildStatus,
    pub worker_id: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub source_path: Option<String>,
    pub certs_path: Option<String>,
    pub result_path: Option<String>,
}

impl From<&Build> for BuildRecord {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id,
            platform: build.platform,
            status: build.status,
            worker_id: build.worker_id,
            submitted_at: build.submitted_at,
            assigned_at: build.assigned_at,
            started_at: build.started_at,
            last_heartbeat_at: build.last_heartbeat_at,
            completed_at: build.completed_at,
            error_message: build.error_message.clone(),
            source_path: build.source_path.clone(),
            certs_path: build.certs_path.clone(),
            result_path: build.result_path.clone(),
        }
    }
}

/// Back-compat shape for `GET /api/builds/:id/status`: the same status
/// view as `BuildRecord`, but timestamps are millisecond-epoch integers
/// rather than ISO-8601 strings, preserved for callers that predate this
/// controller's RFC3339 convention.
#[derive(Debug, Clone, Serialize)]
pub struct BuildStatusCompat {
    pub id: Uuid,
    pub status: BuildStatus,
    pub submitted_at: i64,
    pub assigned_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

impl From<&Build> for BuildStatusCompat {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id,
            status: build.status,
            submitted_at: build.submitted_at.timestamp_millis(),
            assigned_at: build.assigned_at.map(|ts| ts.timestamp_millis()),
            started_at: build.started_at.map(|ts| ts.timestamp_millis()),
            completed_at: build.completed_at.map(|ts| ts.timestamp_millis()),
            error_message: build.error_message.clone(),
        }
    }
}

/// Response returned to the submitter right after `POST /api/builds`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSubmissionResponse {
    pub id: Uuid,
    pub access_token: String,
}

/// Shape of the job envelope a worker receives from a successful poll.
#[derive(Debug, Clone, Serialize)]
pub struct BuildAssignment {
    pub id: Uuid,
    pub platform: Platform,
    pub access_token: String,
    pub otp: String,
    pub otp_expires_at: DateTime<Utc>,
}

/// Body of `POST /api/workers/result`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildResultSubmission {
    pub build_id: Uuid,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Body of `POST /api/builds/:id/authenticate`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateRequest {
    pub otp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateResponse {
    pub vm_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Aggregate counters surfaced by `GET /api/builds/statistics`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BuildStatistics {
    pub pending: i64,
    pub assigned: i64,
    pub building: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}
