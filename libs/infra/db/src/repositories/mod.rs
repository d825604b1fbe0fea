// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY ACCESS MATRIX
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ORQUESTACIÓN DE SUBSISTEMAS DE PERSISTENCIA
 * =================================================================
 */

pub mod build_repository;
pub mod log_repository;
pub mod telemetry_repository;
pub mod worker_repository;

pub use build_repository::BuildRepository;
pub use log_repository::LogRepository;
pub use telemetry_repository::TelemetryRepository;
pub use worker_repository::WorkerRepository;
