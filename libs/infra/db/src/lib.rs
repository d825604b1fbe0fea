// [libs/infra/db/src/lib.rs]
/*!
 * Persistence adapter and dispatch engine for the build controller.
 */

pub mod dispatch;
pub mod errors;
pub mod repositories;
pub mod schema;
pub mod store;

pub use dispatch::DispatchEngine;
pub use errors::RepoError;
pub use repositories::{BuildRepository, LogRepository, TelemetryRepository, WorkerRepository};
pub use store::{Backend, Store};
