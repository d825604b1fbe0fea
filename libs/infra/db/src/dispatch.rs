// [libs/infra/db/src/dispatch.rs]
/*!
 * =================================================================
 * APARATO: DISPATCH ENGINE
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: ASIGNACIÓN ATÓMICA DE BUILDS A WORKERS OCIOSOS
 *
 * Dos caminos, un contrato: `next_for_worker` nunca entrega el mismo
 * build a dos workers.
 *
 * - Postgres (preferido): una transacción con
 *   `SELECT ... FOR UPDATE SKIP LOCKED` sobre la cola de builds pendientes,
 *   de modo que dos pollers concurrentes jamás observen la misma fila.
 * - SQLite (respaldo): un único actor en memoria serializa el pop de la
 *   cola y la escritura de asignación en un mismo turno — un
 *   `Mutex<VecDeque<Uuid>>` hidratado al arranque y reconciliado si la
 *   escritura subsiguiente falla.
 * =================================================================
 */

use crate::errors::RepoError;
use crate::store::{Backend, Store};
use buildctl_core_security::generate_otp;
use buildctl_domain_models::Build;
use chrono::Utc;
use sqlx::{AnyPool, Row};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// How long a dispatched build's one-time password survives before the VM
/// must complete the `authenticate` exchange. Minted fresh on every dispatch,
/// never reused across builds or re-dispatches of the same build.
const OTP_TTL_SECONDS: i64 = 300;

#[derive(Clone)]
pub enum DispatchEngine {
    Native(NativeDispatch),
    Actor(ActorDispatch),
}

impl DispatchEngine {
    pub async fn new(store: &Store) -> Result<Self, RepoError> {
        match store.backend {
            Backend::Postgres => Ok(Self::Native(NativeDispatch { pool: store.pool().clone() })),
            Backend::Sqlite => {
                let actor = ActorDispatch::hydrate(store).await?;
                Ok(Self::Actor(actor))
            }
        }
    }

    pub async fn next_for_worker(&self, worker_id: Uuid) -> Result<Option<Build>, RepoError> {
        match self {
            Self::Native(d) => d.next_for_worker(worker_id).await,
            Self::Actor(d) => d.next_for_worker(worker_id).await,
        }
    }

    /// Re-hydrates the fallback queue with a build that became pending
    /// again (e.g. a retry, or a reassignment from the liveness sweep).
    /// No-op on the native path — SKIP LOCKED reads the table directly.
    pub async fn notify_pending(&self, build_id: Uuid) {
        if let Self::Actor(d) = self {
            d.push_back(build_id).await;
        }
    }

    /// Current depth of the pending-build queue. For the native path this is
    /// a live count of `pending` rows; for the fallback actor it's the
    /// length of the in-memory FIFO, which is what submission backpressure
    /// (see `Config::dispatch_queue_high_water_mark`) actually guards.
    pub async fn pending_len(&self) -> Result<usize, RepoError> {
        match self {
            Self::Native(d) => {
                let row = sqlx::query("SELECT COUNT(*) AS c FROM builds WHERE status = 'pending'")
                    .fetch_one(&d.pool)
                    .await?;
                let count: i64 = row.try_get("c")?;
                Ok(count as usize)
            }
            Self::Actor(d) => Ok(d.queue.lock().await.len()),
        }
    }
}

async fn assign_row(pool: &AnyPool, build_id: Uuid, worker_id: Uuid) -> Result<bool, RepoError> {
    let mut tx = pool.begin().await?;
    let now = Utc::now().to_rfc3339();
    let otp = generate_otp();
    let otp_expires_at = (Utc::now() + chrono::Duration::seconds(OTP_TTL_SECONDS)).to_rfc3339();

    let worker_locked = sqlx::query("SELECT status FROM workers WHERE id = ? AND status = 'idle'")
        .bind(worker_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    if worker_locked.is_none() {
        return Ok(false);
    }

    let affected = sqlx::query(
        "UPDATE builds SET status = 'assigned', worker_id = ?, assigned_at = ?, otp = ?, otp_expires_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(worker_id.to_string())
    .bind(&now)
    .bind(&otp)
    .bind(&otp_expires_at)
    .bind(build_id.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        "UPDATE workers SET status = 'building', current_build_id = ? WHERE id = ?",
    )
    .bind(build_id.to_string())
    .bind(worker_id.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO build_logs (id, build_id, message, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(build_id.to_string())
    .bind(format!("dispatched to worker {worker_id}"))
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

async fn fetch_build(pool: &AnyPool, build_id: Uuid) -> Result<Build, RepoError> {
    let row = sqlx::query("SELECT * FROM builds WHERE id = ?")
        .bind(build_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or(RepoError::NotFound)?;
    crate::repositories::build_repository::map_row(&row)
}

#[derive(Clone)]
pub struct NativeDispatch {
    pool: AnyPool,
}

impl NativeDispatch {
    #[instrument(skip(self))]
    async fn next_for_worker(&self, worker_id: Uuid) -> Result<Option<Build>, RepoError> {
        let mut tx = self.pool.begin().await?;

        let worker_locked = sqlx::query(
            "SELECT status FROM workers WHERE id = ? AND status = 'idle' FOR UPDATE",
        )
        .bind(worker_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        if worker_locked.is_none() {
            return Ok(None);
        }

        let candidate = sqlx::query(
            "SELECT id FROM builds WHERE status = 'pending'
             ORDER BY submitted_at ASC, id ASC
             LIMIT 1 FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let build_id: String = candidate.try_get("id")?;
        let build_id = Uuid::parse_str(&build_id).map_err(|e| RepoError::Validation(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let otp = generate_otp();
        let otp_expires_at = (Utc::now() + chrono::Duration::seconds(OTP_TTL_SECONDS)).to_rfc3339();

        sqlx::query(
            "UPDATE builds SET status = 'assigned', worker_id = ?, assigned_at = ?, otp = ?, otp_expires_at = ?
             WHERE id = ?",
        )
        .bind(worker_id.to_string())
        .bind(&now)
        .bind(&otp)
        .bind(&otp_expires_at)
        .bind(build_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE workers SET status = 'building', current_build_id = ? WHERE id = ?")
            .bind(build_id.to_string())
            .bind(worker_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO build_logs (id, build_id, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(build_id.to_string())
        .bind(format!("dispatched to worker {worker_id}"))
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(%build_id, %worker_id, "build dispatched (native SKIP LOCKED path)");
        fetch_build(&self.pool, build_id).await.map(Some)
    }
}

/// Fallback dispatch for single-writer backends: one `Mutex`-serialized FIFO,
/// hydrated from the pending builds at startup and kept in sync by
/// `notify_pending` whenever a build becomes pending again.
#[derive(Clone)]
pub struct ActorDispatch {
    pool: AnyPool,
    queue: Arc<Mutex<VecDeque<Uuid>>>,
}

impl ActorDispatch {
    async fn hydrate(store: &Store) -> Result<Self, RepoError> {
        let pool = store.pool().clone();
        let rows = sqlx::query(
            "SELECT id FROM builds WHERE status = 'pending' ORDER BY submitted_at ASC, id ASC",
        )
        .fetch_all(&pool)
        .await?;

        let mut queue = VecDeque::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            queue.push_back(Uuid::parse_str(&id).map_err(|e| RepoError::Validation(e.to_string()))?);
        }

        Ok(Self { pool, queue: Arc::new(Mutex::new(queue)) })
    }

    async fn push_back(&self, build_id: Uuid) {
        let mut guard = self.queue.lock().await;
        if !guard.contains(&build_id) {
            guard.push_back(build_id);
        }
    }

    #[instrument(skip(self))]
    async fn next_for_worker(&self, worker_id: Uuid) -> Result<Option<Build>, RepoError> {
        let mut guard = self.queue.lock().await;

        let worker_idle = sqlx::query("SELECT status FROM workers WHERE id = ? AND status = 'idle'")
            .bind(worker_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if worker_idle.is_none() {
            return Ok(None);
        }

        let Some(build_id) = guard.pop_front() else {
            return Ok(None);
        };

        match assign_row(&self.pool, build_id, worker_id).await {
            Ok(true) => {
                info!(%build_id, %worker_id, "build dispatched (actor fallback path)");
                drop(guard);
                fetch_build(&self.pool, build_id).await.map(Some)
            }
            Ok(false) => {
                warn!(%build_id, "actor dispatch rollback: build no longer pending, dropping from queue");
                Ok(None)
            }
            Err(e) => {
                guard.push_front(build_id);
                Err(e)
            }
        }
    }
}
