// [libs/domain/models/src/telemetry.rs]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single VM-reported progress sample for a build in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub id: Uuid,
    pub build_id: Uuid,
    pub stage: String,
    pub progress_percent: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryIngest {
    pub stage: String,
    pub progress_percent: f64,
}
