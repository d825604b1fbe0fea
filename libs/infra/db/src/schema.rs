// [libs/infra/db/src/schema.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN DATABASE SCHEMA
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * Columns are kept to portable types (TEXT/INTEGER/REAL) so the same DDL
 * bootstraps correctly on both Postgres and SQLite; timestamps are stored
 * as RFC3339 text and enums as their lowercase tag, the same convention
 * this codebase's repositories already use for libSQL compatibility.
 * =================================================================
 */

pub const BOOTSTRAP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS builds (
    id TEXT PRIMARY KEY,
    platform TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    access_token TEXT NOT NULL,
    worker_id TEXT,
    submitted_at TEXT NOT NULL,
    assigned_at TEXT,
    started_at TEXT,
    last_heartbeat_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    source_path TEXT,
    certs_path TEXT,
    result_path TEXT,
    vm_token TEXT,
    vm_token_expires_at TEXT,
    otp TEXT,
    otp_expires_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_builds_status_submitted ON builds (status, submitted_at);
CREATE INDEX IF NOT EXISTS idx_builds_worker ON builds (worker_id);
CREATE INDEX IF NOT EXISTS idx_builds_heartbeat ON builds (last_heartbeat_at);

CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'idle',
    access_token TEXT NOT NULL,
    access_token_expires_at TEXT NOT NULL,
    last_seen_at TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    name TEXT,
    capabilities TEXT,
    builds_completed INTEGER NOT NULL DEFAULT 0,
    builds_failed INTEGER NOT NULL DEFAULT 0,
    current_build_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_workers_token ON workers (access_token);
CREATE INDEX IF NOT EXISTS idx_workers_last_seen ON workers (last_seen_at);

CREATE TABLE IF NOT EXISTS build_logs (
    id TEXT PRIMARY KEY,
    build_id TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_build_logs_build ON build_logs (build_id, created_at);

CREATE TABLE IF NOT EXISTS telemetry_samples (
    id TEXT PRIMARY KEY,
    build_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    progress_percent REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_telemetry_build ON telemetry_samples (build_id, recorded_at);
"#;
