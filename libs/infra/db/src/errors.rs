// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ERROR CATALOG
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    /// Physical/network failure talking to the backing store.
    #[error("[L3_DB_NET_FAULT]: database link severed -> {0}")]
    Connection(String),

    /// Environment misconfiguration (empty/malformed `DATABASE_URL`).
    #[error("[L3_DB_CONFIG_FAULT]: database configuration invalid -> {0}")]
    Configuration(String),

    /// Query execution failure surfaced by `sqlx`.
    #[error("[L3_DB_QUERY_FAULT]: query rejected -> {0}")]
    Query(#[from] sqlx::Error),

    /// The requested build does not exist.
    #[error("[L3_BUILD_FAULT]: build not found")]
    NotFound,

    /// The worker does not exist or its token does not match.
    #[error("[L3_WORKER_FAULT]: worker not found")]
    WorkerNotFound,

    /// Optimistic transition guard rejected the write: the build moved out
    /// from under the caller (another worker owns it, or it already
    /// reached a different state).
    #[error("[L3_BUILD_FAULT]: ownership or state conflict")]
    Conflict,

    /// The operation is not legal from the build's current status.
    #[error("[L3_BUILD_FAULT]: illegal state transition")]
    IllegalTransition,

    /// The targeted worker is not idle / not eligible for dispatch.
    #[error("[L3_WORKER_FAULT]: worker busy")]
    WorkerBusy,

    /// The targeted worker's token has expired.
    #[error("[L3_WORKER_FAULT]: worker token expired")]
    WorkerOffline,

    /// Caller-supplied data failed a domain validation rule.
    #[error("[L3_VALIDATION_FAULT]: {0}")]
    Validation(String),
}
