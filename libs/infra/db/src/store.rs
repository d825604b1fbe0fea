// [libs/infra/db/src/store.rs]
/*!
 * =================================================================
 * APARATO: STORE CONNECTION LAYER
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GESTIÓN DE ENLACES Y SELECCIÓN DE BACKEND
 *
 * El backend se decide por la URL de conexión: `postgres://...` habilita
 * el camino de despacho preferido (`SELECT ... FOR UPDATE SKIP LOCKED`);
 * cualquier otra URL (`sqlite::memory:`, `sqlite://...`) cae al camino de
 * respaldo de un solo actor en memoria descrito en el motor de despacho.
 * =================================================================
 */

use crate::errors::RepoError;
use crate::schema::BOOTSTRAP_SCHEMA;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Supports `FOR UPDATE SKIP LOCKED` — the preferred dispatch path.
    Postgres,
    /// Single-writer engine — dispatch falls back to the in-memory actor.
    Sqlite,
}

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: AnyPool,
    pub backend: Backend,
}

impl Store {
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, RepoError> {
        if database_url.is_empty() {
            return Err(RepoError::Configuration("DATABASE_URL is unset".into()));
        }

        install_default_drivers();

        let backend = if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            Backend::Postgres
        } else {
            Backend::Sqlite
        };

        let pool = AnyPoolOptions::new()
            .max_connections(if backend == Backend::Sqlite { 1 } else { 10 })
            .connect(database_url)
            .await
            .map_err(|e| RepoError::Connection(e.to_string()))?;

        sqlx::raw_sql(BOOTSTRAP_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| RepoError::Connection(format!("schema bootstrap failed: {e}")))?;

        info!(backend = ?backend, "store connected and schema applied");

        Ok(Self { pool, backend })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}
