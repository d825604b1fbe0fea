// [libs/infra/db/src/repositories/log_repository.rs]
use crate::errors::RepoError;
use crate::store::Store;
use buildctl_domain_models::BuildLog;
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

pub struct LogRepository {
    pool: AnyPool,
}

impl LogRepository {
    pub fn new(store: &Store) -> Self {
        Self { pool: store.pool().clone() }
    }

    pub async fn append(&self, build_id: Uuid, message: &str) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO build_logs (id, build_id, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(build_id.to_string())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn for_build(&self, build_id: Uuid) -> Result<Vec<BuildLog>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM build_logs WHERE build_id = ? ORDER BY created_at ASC",
        )
        .bind(build_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let build_id: String = row.try_get("build_id")?;
                let created_at: String = row.try_get("created_at")?;
                Ok(BuildLog {
                    id: Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?,
                    build_id: Uuid::parse_str(&build_id)
                        .map_err(|e| RepoError::Validation(e.to_string()))?,
                    message: row.try_get("message")?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| RepoError::Validation(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }
}
