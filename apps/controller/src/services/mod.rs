// [apps/controller/src/services/mod.rs]
pub mod liveness;
