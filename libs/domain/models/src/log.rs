// [libs/domain/models/src/log.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a build's activity trail: state transitions, worker actions,
/// and VM-reported progress all land here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLog {
    pub id: Uuid,
    pub build_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildLogEntry {
    pub message: String,
}
