// [libs/infra/db/src/repositories/worker_repository.rs]
/*!
 * Worker registry persistence: registration, token rotation, and the
 * heartbeat write that keeps a worker out of the liveness supervisor's
 * offline sweep.
 */

use crate::errors::RepoError;
use crate::store::Store;
use buildctl_domain_models::{Worker, WorkerStatus};
use chrono::{DateTime, Duration, Utc};
use sqlx::{AnyPool, Row};
use tracing::instrument;
use uuid::Uuid;

pub struct WorkerRepository {
    pool: AnyPool,
}

fn parse_status(raw: &str) -> WorkerStatus {
    match raw {
        "building" => WorkerStatus::Building,
        "offline" => WorkerStatus::Offline,
        _ => WorkerStatus::Idle,
    }
}

fn map_row(row: &sqlx::any::AnyRow) -> Result<Worker, RepoError> {
    let id: String = row.try_get("id")?;
    let current_build_id: Option<String> = row.try_get("current_build_id")?;
    let expires_at: String = row.try_get("access_token_expires_at")?;
    let last_seen_at: String = row.try_get("last_seen_at")?;
    let registered_at: String = row.try_get("registered_at")?;
    let capabilities: Option<String> = row.try_get("capabilities")?;

    Ok(Worker {
        id: Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?,
        status: parse_status(&row.try_get::<String, _>("status")?),
        access_token: row.try_get("access_token")?,
        access_token_expires_at: DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| RepoError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        last_seen_at: DateTime::parse_from_rfc3339(&last_seen_at)
            .map_err(|e| RepoError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        registered_at: DateTime::parse_from_rfc3339(&registered_at)
            .map_err(|e| RepoError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        name: row.try_get("name")?,
        capabilities: capabilities.and_then(|raw| serde_json::from_str(&raw).ok()),
        builds_completed: row.try_get("builds_completed")?,
        builds_failed: row.try_get("builds_failed")?,
        current_build_id: current_build_id
            .map(|v| Uuid::parse_str(&v))
            .transpose()
            .map_err(|e| RepoError::Validation(e.to_string()))?,
    })
}

/// Mints a fresh random token for the worker token family. 256 bits of
/// entropy, hex-encoded — generation lives in `buildctl-core-security`;
/// repositories only persist what they're handed.
pub use buildctl_core_security::generate_token as mint_token;

impl WorkerRepository {
    pub fn new(store: &Store) -> Self {
        Self { pool: store.pool().clone() }
    }

    /// Registers a new worker, or rotates the token of an existing one
    /// without disturbing its status or assigned builds. `name`/
    /// `capabilities` only overwrite the stored value when supplied —
    /// a bare re-registration (both `None`) leaves them as they were.
    #[instrument(skip(self, name, capabilities))]
    pub async fn register(
        &self,
        id: Uuid,
        ttl_seconds: i64,
        name: Option<&str>,
        capabilities: Option<&serde_json::Value>,
    ) -> Result<Worker, RepoError> {
        let token = mint_token();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);
        let capabilities_json = capabilities.map(|v| v.to_string());

        let existing = sqlx::query("SELECT id FROM workers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE workers SET access_token = ?, access_token_expires_at = ?, last_seen_at = ?,
                 name = COALESCE(?, name), capabilities = COALESCE(?, capabilities)
                 WHERE id = ?",
            )
            .bind(&token)
            .bind(expires_at.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(name)
            .bind(&capabilities_json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO workers
                 (id, status, access_token, access_token_expires_at, last_seen_at, registered_at,
                  name, capabilities, builds_completed, builds_failed)
                 VALUES (?, 'idle', ?, ?, ?, ?, ?, ?, 0, 0)",
            )
            .bind(id.to_string())
            .bind(&token)
            .bind(expires_at.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(name)
            .bind(&capabilities_json)
            .execute(&self.pool)
            .await?;
        }

        self.find(id).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Worker, RepoError> {
        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::WorkerNotFound)?;
        map_row(&row)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Worker, RepoError> {
        let row = sqlx::query("SELECT * FROM workers WHERE access_token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::WorkerNotFound)?;
        map_row(&row)
    }

    /// Touches `last_seen_at` and mints the next rotation of the worker's
    /// token. The token supplied on the *current* request remains valid for
    /// the remainder of the request even after this call rotates it — the
    /// caller holds the pre-rotation value locally for that purpose.
    #[instrument(skip(self))]
    pub async fn heartbeat_and_rotate(&self, id: Uuid, ttl_seconds: i64) -> Result<Worker, RepoError> {
        let token = mint_token();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);

        sqlx::query(
            "UPDATE workers SET last_seen_at = ?, access_token = ?, access_token_expires_at = ?
             WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(&token)
        .bind(expires_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        self.find(id).await
    }

    pub async fn list(&self) -> Result<Vec<Worker>, RepoError> {
        let rows = sqlx::query("SELECT * FROM workers ORDER BY last_seen_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_row).collect()
    }

    #[instrument(skip(self))]
    pub async fn increment_completed(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE workers SET builds_completed = builds_completed + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn increment_failed(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE workers SET builds_failed = builds_failed + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Touches `last_seen_at` without rotating the token. Used by the
    /// admin-initiated heartbeat endpoint, for operator tooling that nudges
    /// a worker's liveness clock without going through its own poll loop.
    #[instrument(skip(self))]
    pub async fn touch_last_seen(&self, id: Uuid) -> Result<(), RepoError> {
        let affected = sqlx::query("UPDATE workers SET last_seen_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(RepoError::WorkerNotFound);
        }
        Ok(())
    }

    /// Frees a worker back to `idle` if and only if it's still holding the
    /// given build — guards against freeing a worker that has since moved
    /// on to a different build by the time the sweep gets to it.
    #[instrument(skip(self))]
    pub async fn free_if_holding(&self, id: Uuid, build_id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE workers SET status = 'idle', current_build_id = NULL
             WHERE id = ? AND current_build_id = ?",
        )
        .bind(id.to_string())
        .bind(build_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_offline(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE workers SET status = 'offline', current_build_id = NULL WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Offline sweep: workers silent past `timeout_seconds` and not already
    /// `offline` get marked so, paired with `reassign_all_for_worker` on the
    /// build side.
    #[instrument(skip(self))]
    pub async fn find_stale(&self, timeout_seconds: i64) -> Result<Vec<Uuid>, RepoError> {
        let cutoff = (Utc::now() - Duration::seconds(timeout_seconds)).to_rfc3339();
        let rows = sqlx::query(
            "SELECT id FROM workers WHERE last_seen_at < ? AND status != 'offline'",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))
            })
            .collect()
    }
}
