// [apps/controller/tests/dispatch_no_double_assignment.rs]
//! Concurrency property: with N pending builds and M idle workers racing
//! `next_for_worker`, no build is ever handed to two workers and no worker
//! is ever handed two builds.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_polls_never_double_assign_a_build() {
    let (state, _blobs) = boot_state().await;

    const BUILD_COUNT: usize = 40;
    const WORKER_COUNT: usize = 12;

    let mut worker_ids = Vec::with_capacity(WORKER_COUNT);
    for _ in 0..WORKER_COUNT {
        let id = Uuid::new_v4();
        state
            .workers
            .register(id, state.config.worker_token_ttl_seconds, None, None)
            .await
            .expect("register worker");
        worker_ids.push(id);
    }

    for _ in 0..BUILD_COUNT {
        let token = buildctl_core_security::generate_token();
        let build = state
            .builds
            .create(buildctl_domain_models::Platform::Ios, &token)
            .await
            .expect("create build");
        state.dispatch.notify_pending(build.id).await;
    }

    let assignments: Arc<Mutex<HashMap<Uuid, Uuid>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut handles = Vec::new();

    // Each worker polls repeatedly until the queue is drained or it gives up.
    for worker_id in worker_ids {
        let state = state.clone();
        let assignments = assignments.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..(BUILD_COUNT + 5) {
                match state.dispatch.next_for_worker(worker_id).await {
                    Ok(Some(build)) => {
                        let mut map = assignments.lock().unwrap();
                        if let Some(existing_owner) = map.insert(build.id, worker_id) {
                            panic!(
                                "build {} double-assigned to {} and {}",
                                build.id, existing_owner, worker_id
                            );
                        }
                        drop(map);
                        // finish() frees the worker back to idle so it can
                        // race for another build on the next loop iteration.
                        state
                            .builds
                            .finish(build.id, worker_id, true, None, None)
                            .await
                            .expect("finish build");
                    }
                    Ok(None) => break,
                    Err(error) => panic!("dispatch error: {error}"),
                }
            }
        }));
    }

    for handle in handles {
        handle.await.expect("worker task panicked");
    }

    let map = assignments.lock().unwrap();
    assert_eq!(map.len(), BUILD_COUNT, "every build must be assigned exactly once");

    let stats = state.builds.statistics().await.expect("statistics");
    assert_eq!(stats.completed as usize, BUILD_COUNT);
    assert_eq!(stats.pending, 0);
}

async fn boot_state() -> (buildctl_controller::state::AppState, tempfile::TempDir) {
    let blob_root = tempfile::tempdir().expect("tempdir");
    let config = buildctl_controller::config::Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        blob_root: blob_root.path().to_path_buf(),
        admin_api_key: "stress-test-admin-key".to_string(),
        worker_token_ttl_seconds: 90,
        vm_token_ttl_seconds: 3600,
        build_heartbeat_timeout_seconds: 300,
        worker_offline_timeout_seconds: 300,
        liveness_scan_interval_seconds: 60,
        max_upload_bytes: 64 * 1024 * 1024,
        dispatch_queue_high_water_mark: 10_000,
    };
    let state = buildctl_controller::state::AppState::bootstrap(config)
        .await
        .expect("bootstrap app state");
    (state, blob_root)
}
