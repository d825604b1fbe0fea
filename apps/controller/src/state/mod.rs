// [apps/controller/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: APPLICATION STATE
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * RESPONSABILIDAD: COMPOSICIÓN DE DEPENDENCIAS COMPARTIDAS
 * =================================================================
 */

use crate::config::Config;
use buildctl_infra_blobstore::BlobStore;
use buildctl_infra_db::{BuildRepository, DispatchEngine, LogRepository, Store, TelemetryRepository, WorkerRepository};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub builds: Arc<BuildRepository>,
    pub workers: Arc<WorkerRepository>,
    pub logs: Arc<LogRepository>,
    pub telemetry: Arc<TelemetryRepository>,
    pub dispatch: Arc<DispatchEngine>,
    pub blobs: Arc<BlobStore>,
}

impl AppState {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let store = Store::connect(&config.database_url).await?;
        let dispatch = DispatchEngine::new(&store).await?;
        let blobs = BlobStore::new(config.blob_root.clone()).await?;

        Ok(Self {
            builds: Arc::new(BuildRepository::new(&store)),
            workers: Arc::new(WorkerRepository::new(&store)),
            logs: Arc::new(LogRepository::new(&store)),
            telemetry: Arc::new(TelemetryRepository::new(&store)),
            dispatch: Arc::new(dispatch),
            blobs: Arc::new(blobs),
            config: Arc::new(config),
        })
    }
}
