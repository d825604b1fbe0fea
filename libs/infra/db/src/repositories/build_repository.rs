// [libs/infra/db/src/repositories/build_repository.rs]
/*!
 * =================================================================
 * APARATO: BUILD REPOSITORY
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA Y TRANSICIONES DE ESTADO DE UN BUILD
 *
 * Toda transición de estado pasa por un UPDATE guardado con su propia
 * cláusula WHERE de estado/propiedad; una fila afectada igual a cero
 * nunca se interpreta como éxito silencioso, siempre se diagnostica.
 * =================================================================
 */

use crate::errors::RepoError;
use crate::store::Store;
use buildctl_domain_models::{Build, BuildStatistics, BuildStatus, Platform};
use chrono::{DateTime, Utc};
use sqlx::{AnyPool, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

pub struct BuildRepository {
    pool: AnyPool,
}

fn parse_status(raw: &str) -> BuildStatus {
    match raw {
        "pending" => BuildStatus::Pending,
        "assigned" => BuildStatus::Assigned,
        "building" => BuildStatus::Building,
        "completed" => BuildStatus::Completed,
        "failed" => BuildStatus::Failed,
        _ => BuildStatus::Cancelled,
    }
}

fn parse_platform(raw: &str) -> Platform {
    match raw {
        "android" => Platform::Android,
        _ => Platform::Ios,
    }
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn map_row(row: &sqlx::any::AnyRow) -> Result<Build, RepoError> {
    let id: String = row.try_get("id")?;
    let worker_id: Option<String> = row.try_get("worker_id")?;
    let submitted_at: String = row.try_get("submitted_at")?;

    Ok(Build {
        id: Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?,
        platform: parse_platform(&row.try_get::<String, _>("platform")?),
        status: parse_status(&row.try_get::<String, _>("status")?),
        access_token: row.try_get("access_token")?,
        worker_id: worker_id
            .map(|w| Uuid::parse_str(&w))
            .transpose()
            .map_err(|e| RepoError::Validation(e.to_string()))?,
        submitted_at: DateTime::parse_from_rfc3339(&submitted_at)
            .map_err(|e| RepoError::Validation(e.to_string()))?
            .with_timezone(&Utc),
        assigned_at: parse_ts(row.try_get("assigned_at")?),
        started_at: parse_ts(row.try_get("started_at")?),
        last_heartbeat_at: parse_ts(row.try_get("last_heartbeat_at")?),
        completed_at: parse_ts(row.try_get("completed_at")?),
        error_message: row.try_get("error_message")?,
        source_path: row.try_get("source_path")?,
        certs_path: row.try_get("certs_path")?,
        result_path: row.try_get("result_path")?,
        vm_token: row.try_get("vm_token")?,
        vm_token_expires_at: parse_ts(row.try_get("vm_token_expires_at")?),
        otp: row.try_get("otp")?,
        otp_expires_at: parse_ts(row.try_get("otp_expires_at")?),
    })
}

impl BuildRepository {
    pub fn new(store: &Store) -> Self {
        Self { pool: store.pool().clone() }
    }

    #[instrument(skip(self, access_token))]
    pub async fn create(
        &self,
        platform: Platform,
        access_token: &str,
    ) -> Result<Build, RepoError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO builds (id, platform, status, access_token, submitted_at)
             VALUES (?, ?, 'pending', ?, ?)",
        )
        .bind(id.to_string())
        .bind(match platform {
            Platform::Ios => "ios",
            Platform::Android => "android",
        })
        .bind(access_token)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find(id).await
    }

    pub async fn find(&self, id: Uuid) -> Result<Build, RepoError> {
        let row = sqlx::query("SELECT * FROM builds WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
        map_row(&row)
    }

    pub async fn list_active(&self) -> Result<Vec<Build>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM builds WHERE status IN ('pending', 'assigned', 'building')
             ORDER BY submitted_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    /// Full set, every status, for `GET /api/builds`. No pagination: the
    /// core caps list size at whatever a single build mesh naturally
    /// produces rather than windowing it.
    pub async fn list_all(&self) -> Result<Vec<Build>, RepoError> {
        let rows = sqlx::query("SELECT * FROM builds ORDER BY submitted_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_row).collect()
    }

    /// Stamps the blob-store keys for the source/certs artifacts saved at
    /// submission time. Called once, right after the blobs land, so a
    /// crash between the DB insert and the blob write never leaves a
    /// path pointing at bytes that don't exist.
    #[instrument(skip(self, path))]
    pub async fn set_source_path(&self, id: Uuid, path: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE builds SET source_path = ? WHERE id = ?")
            .bind(path)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, path))]
    pub async fn set_certs_path(&self, id: Uuid, path: &str) -> Result<(), RepoError> {
        sqlx::query("UPDATE builds SET certs_path = ? WHERE id = ?")
            .bind(path)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Moves a build to `completed` or `failed`, freeing the worker in the
    /// same transaction. Guarded on `worker_id` ownership, not just id.
    /// `result_path` is stamped only on success; a failed build never had
    /// a result artifact to point at.
    #[instrument(skip(self, error_message, result_path))]
    pub async fn finish(
        &self,
        id: Uuid,
        worker_id: Uuid,
        success: bool,
        error_message: Option<&str>,
        result_path: Option<&str>,
    ) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();
        let target_status = if success { "completed" } else { "failed" };
        let result_path = if success { result_path } else { None };

        let affected = sqlx::query(
            "UPDATE builds SET status = ?, completed_at = ?, error_message = ?, result_path = ?
             WHERE id = ? AND worker_id = ? AND status IN ('assigned', 'building')",
        )
        .bind(target_status)
        .bind(&now)
        .bind(error_message)
        .bind(result_path)
        .bind(id.to_string())
        .bind(worker_id.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected == 0 {
            warn!(build_id = %id, "finish rejected: build not owned or not in flight");
            return Err(self.diagnose(id, &mut tx).await?);
        }

        sqlx::query(
            "UPDATE workers SET status = 'idle', current_build_id = NULL WHERE id = ?",
        )
        .bind(worker_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// `assigned -> building` on the first call, a plain liveness touch on
    /// every call after: `status` is unconditionally set to `building` (a
    /// no-op once already there) and `started_at` is stamped only the
    /// first time via `COALESCE`. Driven by the build's own heartbeat
    /// endpoint and by the first log/telemetry line the VM reports.
    #[instrument(skip(self))]
    pub async fn heartbeat(&self, id: Uuid, worker_id: Uuid) -> Result<(), RepoError> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE builds SET status = 'building', last_heartbeat_at = ?,
             started_at = COALESCE(started_at, ?)
             WHERE id = ? AND worker_id = ? AND status IN ('assigned', 'building')",
        )
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .bind(worker_id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(RepoError::Conflict);
        }
        Ok(())
    }

    /// Cancels a build from any non-terminal state. Does not touch the
    /// worker row directly — the liveness supervisor or unregister path
    /// reconciles worker state when it observes the build gone.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<(), RepoError> {
        let affected = sqlx::query(
            "UPDATE builds SET status = 'cancelled', completed_at = ?
             WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(RepoError::IllegalTransition);
        }
        Ok(())
    }

    #[instrument(skip(self, otp))]
    pub async fn set_otp(
        &self,
        id: Uuid,
        otp: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        sqlx::query("UPDATE builds SET otp = ?, otp_expires_at = ? WHERE id = ?")
            .bind(otp)
            .bind(expires_at.to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Consumes the build's one-time password for a `vm_token`. The OTP is
    /// cleared whether or not the exchange succeeds, once it's expired, so a
    /// guessed-but-stale code can't be retried indefinitely.
    #[instrument(skip(self, otp, vm_token))]
    pub async fn authenticate(
        &self,
        id: Uuid,
        otp: &str,
        vm_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE builds SET vm_token = ?, vm_token_expires_at = ?, otp = NULL, otp_expires_at = NULL
             WHERE id = ? AND otp = ? AND otp_expires_at > ?",
        )
        .bind(vm_token)
        .bind(expires_at.to_rfc3339())
        .bind(id.to_string())
        .bind(otp)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(RepoError::Validation("otp mismatch, expired, or already consumed".into()));
        }
        Ok(())
    }

    pub async fn find_by_vm_token(&self, vm_token: &str) -> Result<Build, RepoError> {
        let row = sqlx::query("SELECT * FROM builds WHERE vm_token = ?")
            .bind(vm_token)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
        map_row(&row)
    }

    pub async fn statistics(&self) -> Result<BuildStatistics, RepoError> {
        let rows = sqlx::query("SELECT status, COUNT(*) as count FROM builds GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = BuildStatistics::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            match status.as_str() {
                "pending" => stats.pending = count,
                "assigned" => stats.assigned = count,
                "building" => stats.building = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Reassigns every in-flight build owned by `worker_id` back to
    /// `pending`, clearing ownership. Used by unregister and the
    /// liveness supervisor's offline-worker sweep.
    #[instrument(skip(self))]
    pub async fn reassign_all_for_worker(&self, worker_id: Uuid) -> Result<i64, RepoError> {
        let affected = sqlx::query(
            "UPDATE builds SET status = 'pending', worker_id = NULL, assigned_at = NULL
             WHERE worker_id = ? AND status IN ('assigned', 'building')",
        )
        .bind(worker_id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected as i64)
    }

    /// Liveness sweep: builds whose heartbeat has gone silent past
    /// `timeout_seconds` are marked `failed`. Returns each stale build
    /// paired with the worker that was holding it (if any), so the caller
    /// can free that worker back to `idle` in the same sweep.
    #[instrument(skip(self))]
    pub async fn fail_stale(&self, timeout_seconds: i64) -> Result<Vec<(Uuid, Option<Uuid>)>, RepoError> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(timeout_seconds)).to_rfc3339();

        let rows = sqlx::query(
            "SELECT id, worker_id FROM builds
             WHERE status IN ('assigned', 'building')
             AND COALESCE(last_heartbeat_at, assigned_at) < ?",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut stale = Vec::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            let id = Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?;
            let worker_id: Option<String> = row.try_get("worker_id")?;
            let worker_id = worker_id
                .map(|w| Uuid::parse_str(&w))
                .transpose()
                .map_err(|e| RepoError::Validation(e.to_string()))?;
            stale.push((id, worker_id));
        }

        for (id, _) in &stale {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "UPDATE builds SET status = 'failed', error_message = 'no heartbeat / timeout',
                 completed_at = ? WHERE id = ? AND status IN ('assigned', 'building')",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        Ok(stale)
    }

    async fn diagnose(
        &self,
        id: Uuid,
        tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    ) -> Result<RepoError, RepoError> {
        let row = sqlx::query("SELECT status FROM builds WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            None => Ok(RepoError::NotFound),
            Some(row) => {
                let status: String = row.try_get("status")?;
                if status == "completed" || status == "failed" {
                    Ok(RepoError::IllegalTransition)
                } else {
                    Ok(RepoError::Conflict)
                }
            }
        }
    }
}
