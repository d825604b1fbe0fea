// [apps/controller/src/handlers/mod.rs]
pub mod admin;
pub mod builds;
pub mod workers;
