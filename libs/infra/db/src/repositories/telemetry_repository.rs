// [libs/infra/db/src/repositories/telemetry_repository.rs]
use crate::errors::RepoError;
use crate::store::Store;
use buildctl_domain_models::TelemetrySample;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

pub struct TelemetryRepository {
    pool: AnyPool,
}

impl TelemetryRepository {
    pub fn new(store: &Store) -> Self {
        Self { pool: store.pool().clone() }
    }

    pub async fn record(
        &self,
        build_id: Uuid,
        stage: &str,
        progress_percent: f64,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO telemetry_samples (id, build_id, stage, progress_percent, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(build_id.to_string())
        .bind(stage)
        .bind(progress_percent)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_build(&self, build_id: Uuid) -> Result<Vec<TelemetrySample>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM telemetry_samples WHERE build_id = ? ORDER BY recorded_at ASC",
        )
        .bind(build_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let build_id: String = row.try_get("build_id")?;
                let recorded_at: String = row.try_get("recorded_at")?;
                Ok(TelemetrySample {
                    id: Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?,
                    build_id: Uuid::parse_str(&build_id)
                        .map_err(|e| RepoError::Validation(e.to_string()))?,
                    stage: row.try_get("stage")?,
                    progress_percent: row.try_get("progress_percent")?,
                    recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                        .map_err(|e| RepoError::Validation(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}
