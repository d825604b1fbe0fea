// [apps/controller/src/services/liveness.rs]
/*!
 * =================================================================
 * APARATO: LIVENESS SUPERVISOR
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * RESPONSABILIDAD: DETECCIÓN Y RECONCILIACIÓN DE ESTADO HUÉRFANO
 *
 * Un daemon residente sin estado propio: cada tick vuelve a consultar la
 * base de datos desde cero, de modo que un reinicio del proceso en
 * cualquier punto nunca deja huérfanos más allá del siguiente tick.
 * =================================================================
 */

use crate::state::AppState;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

/// Spawns the resident liveness daemon. Never returns; intended to be
/// `tokio::spawn`ed once at process startup.
pub async fn run(state: AppState) {
    let mut ticker = time::interval(Duration::from_secs(state.config.liveness_scan_interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        scan_once(&state).await;
    }
}

async fn scan_once(state: &AppState) {
    match state
        .builds
        .fail_stale(state.config.build_heartbeat_timeout_seconds)
        .await
    {
        Ok(stale) if !stale.is_empty() => {
            warn!(count = stale.len(), "liveness sweep: builds failed for lack of heartbeat");
            for (build_id, worker_id) in stale {
                let Some(worker_id) = worker_id else { continue };
                if let Err(error) = state.workers.free_if_holding(worker_id, build_id).await {
                    warn!(%worker_id, %build_id, %error, "liveness sweep: failed to free worker after stuck build");
                }
            }
        }
        Ok(_) => {}
        Err(error) => warn!(%error, "liveness sweep: stuck-build scan failed"),
    }

    let stale_workers = match state
        .workers
        .find_stale(state.config.worker_offline_timeout_seconds)
        .await
    {
        Ok(workers) => workers,
        Err(error) => {
            warn!(%error, "liveness sweep: offline-worker scan failed");
            return;
        }
    };

    for worker_id in stale_workers {
        let owned: Vec<_> = match state.builds.list_active().await {
            Ok(active) => active
                .into_iter()
                .filter(|b| b.worker_id == Some(worker_id))
                .map(|b| b.id)
                .collect(),
            Err(error) => {
                warn!(%worker_id, %error, "liveness sweep: failed to list worker's active builds");
                continue;
            }
        };

        match state.builds.reassign_all_for_worker(worker_id).await {
            Ok(count) => {
                if count > 0 {
                    info!(%worker_id, reassigned = count, "liveness sweep: reassigned builds from offline worker");
                }
                for build_id in owned {
                    state.dispatch.notify_pending(build_id).await;
                }
            }
            Err(error) => {
                warn!(%worker_id, %error, "liveness sweep: failed to reassign worker's builds");
                continue;
            }
        }

        if let Err(error) = state.workers.mark_offline(worker_id).await {
            warn!(%worker_id, %error, "liveness sweep: failed to mark worker offline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use uuid::Uuid;

    async fn boot() -> (AppState, tempfile::TempDir) {
        let blob_root = tempfile::tempdir().expect("tempdir");
        let config = Config {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            blob_root: blob_root.path().to_path_buf(),
            admin_api_key: "liveness-test-admin-key".to_string(),
            worker_token_ttl_seconds: 90,
            vm_token_ttl_seconds: 3600,
            build_heartbeat_timeout_seconds: 0,
            worker_offline_timeout_seconds: 300,
            liveness_scan_interval_seconds: 60,
            max_upload_bytes: 64 * 1024 * 1024,
            dispatch_queue_high_water_mark: 10_000,
        };
        let state = AppState::bootstrap(config).await.expect("bootstrap");
        (state, blob_root)
    }

    #[tokio::test]
    async fn stuck_build_scan_fails_the_build_and_frees_its_worker() {
        let (state, _blobs) = boot().await;

        let worker_id = Uuid::new_v4();
        state
            .workers
            .register(worker_id, 90, None, None)
            .await
            .expect("register worker");

        let token = buildctl_core_security::generate_token();
        let build = state
            .builds
            .create(buildctl_domain_models::Platform::Ios, &token)
            .await
            .expect("create build");
        state.dispatch.notify_pending(build.id).await;

        let dispatched = state
            .dispatch
            .next_for_worker(worker_id)
            .await
            .expect("dispatch")
            .expect("a build was assigned");
        assert_eq!(dispatched.id, build.id);

        // `build_heartbeat_timeout_seconds` is 0 above, so the build is
        // already "stale" the instant it's assigned.
        scan_once(&state).await;

        let refreshed = state.builds.find(build.id).await.expect("find build");
        assert_eq!(refreshed.status, buildctl_domain_models::BuildStatus::Failed);

        let worker = state.workers.find(worker_id).await.expect("find worker");
        assert_eq!(worker.status, buildctl_domain_models::WorkerStatus::Idle);
        assert_eq!(worker.current_build_id, None);
    }
}
