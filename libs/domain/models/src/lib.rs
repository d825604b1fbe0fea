pub mod build;
pub mod log;
pub mod telemetry;
pub mod worker;

pub use build::{
    AuthenticateRequest, AuthenticateResponse, Build, BuildAssignment, BuildRecord,
    BuildResultSubmission, BuildStatistics, BuildStatus, BuildStatusCompat,
    BuildSubmissionResponse, Platform,
};
pub use log::{BuildLog, BuildLogEntry};
pub use telemetry::{TelemetryIngest, TelemetrySample};
pub use worker::{
    Worker, WorkerFailBody, WorkerIdBody, WorkerPollResponse, WorkerRegistration,
    WorkerRegistrationResponse, WorkerStats, WorkerStatus, WorkerUnregisterResponse,
};
