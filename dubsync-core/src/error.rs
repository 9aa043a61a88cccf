//! Error types for the dubsync alignment engine.

use thiserror::Error;

/// Errors surfaced by `dubsync-core` operations.
#[derive(Debug, Error)]
pub enum AudioSyncError {
    #[error("input file not found: {path}")]
    InputMissing { path: String },

    #[error("unsupported audio format in {path}: {detail}")]
    UnsupportedFormat { path: String, detail: String },

    #[error("failed to decode {path}: {detail}")]
    DecodeFailed { path: String, detail: String },

    #[error("requested range [{start_ms}, {end_ms}) of {path} is empty")]
    RangeEmpty {
        path: String,
        start_ms: f64,
        end_ms: f64,
    },

    #[error("compensation plan is infeasible at boundary starting {boundary_start_ms}ms")]
    PlanInfeasible { boundary_start_ms: f64 },

    #[error("I/O failure on {path}: {detail}")]
    IoFailed { path: String, detail: String },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, AudioSyncError>;
