// [apps/controller/src/config.rs]
/*!
 * Process-wide configuration, hydrated once from the environment at
 * startup. No live-reload: a config value baked in here is fixed for the
 * lifetime of the process.
 */

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub blob_root: PathBuf,
    pub admin_api_key: String,
    pub worker_token_ttl_seconds: i64,
    pub vm_token_ttl_seconds: i64,
    pub build_heartbeat_timeout_seconds: i64,
    pub worker_offline_timeout_seconds: i64,
    pub liveness_scan_interval_seconds: u64,
    pub max_upload_bytes: usize,
    pub dispatch_queue_high_water_mark: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            port: env_parse("PORT", 8080)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite::memory:".to_string()),
            blob_root: env::var("BLOB_STORE_ROOT")
                .unwrap_or_else(|_| "./data/blobs".to_string())
                .into(),
            admin_api_key: {
                let key = env::var("ADMIN_API_KEY")
                    .map_err(|_| anyhow::anyhow!("ADMIN_API_KEY must be set"))?;
                if key.len() < 32 {
                    anyhow::bail!("ADMIN_API_KEY must be at least 32 characters");
                }
                key
            },
            worker_token_ttl_seconds: env_parse("WORKER_TOKEN_TTL_SECONDS", 90)?,
            vm_token_ttl_seconds: env_parse("VM_TOKEN_TTL_SECONDS", 3600 * 6)?,
            build_heartbeat_timeout_seconds: env_parse("BUILD_HEARTBEAT_TIMEOUT_SECONDS", 300)?,
            worker_offline_timeout_seconds: env_parse("WORKER_OFFLINE_TIMEOUT_SECONDS", 300)?,
            liveness_scan_interval_seconds: env_parse("LIVENESS_SCAN_INTERVAL_SECONDS", 60)?,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 512 * 1024 * 1024)?,
            dispatch_queue_high_water_mark: env_parse("DISPATCH_QUEUE_HIGH_WATER_MARK", 10_000)?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
