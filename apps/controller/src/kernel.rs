// [apps/controller/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: PROCESS KERNEL
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * RESPONSABILIDAD: ARRANQUE DEL DAEMON RESIDENTE Y DEL SERVIDOR HTTP
 * =================================================================
 */

use crate::config::Config;
use crate::routes::build_router;
use crate::services::liveness;
use crate::state::AppState;
use std::net::SocketAddr;
use tracing::info;

/// Bootstraps application state, spawns the liveness supervisor, and binds
/// the HTTP listener. Runs until the listener is shut down.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let port = config.port;
    let state = AppState::bootstrap(config).await?;

    tokio::spawn(liveness::run(state.clone()));

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "build controller listening");
    axum::serve(listener, router).await?;
    Ok(())
}
