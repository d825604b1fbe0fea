// [apps/controller/tests/support/mod.rs]
#![allow(dead_code)] // shared across test binaries; not every binary uses every helper

use buildctl_controller::config::Config;
use buildctl_controller::routes::build_router;
use buildctl_controller::state::AppState;
use tempfile::TempDir;

pub const ADMIN_KEY: &str = "test-admin-key-do-not-use-in-prod";

/// Boots an `AppState` against a private in-memory SQLite database and a
/// scratch blob root, so tests never share state with each other or with a
/// real deployment.
pub async fn test_app() -> (axum::Router, TempDir) {
    let blob_root = tempfile::tempdir().expect("tempdir");

    let config = Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        blob_root: blob_root.path().to_path_buf(),
        admin_api_key: ADMIN_KEY.to_string(),
        worker_token_ttl_seconds: 90,
        vm_token_ttl_seconds: 3600,
        build_heartbeat_timeout_seconds: 300,
        worker_offline_timeout_seconds: 300,
        liveness_scan_interval_seconds: 60,
        max_upload_bytes: 64 * 1024 * 1024,
        dispatch_queue_high_water_mark: 10_000,
    };

    let state = AppState::bootstrap(config).await.expect("bootstrap app state");
    let router = build_router(state);
    (router, blob_root)
}

/// Builds a `multipart/form-data` body from `(field name, contents)` pairs.
/// Every field is sent as a file part — good enough for this crate's
/// handlers, which read every multipart field by `.text()`/`.bytes()`
/// regardless of whether a filename is present.
pub fn multipart_body(boundary: &str, fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.bin\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(value);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
