//! dubsync core — onset-envelope cross-correlation alignment and
//! drift-compensation engine for secondary audio tracks.
//!
//! This crate provides:
//! - **models**: Data structures (PcmBuffer, OnsetEnvelope, AlignmentResult,
//!   DriftPoint, AudioSegment, EditPlan, config types).
//! - **error**: The `AudioSyncError` error enum shared by every operation.
//! - **pcm_io**: Strict-format mono PCM16 WAV loading and writing.
//! - **onset**: Spectral-flux onset-strength envelope extraction.
//! - **align**: FFT cross-correlation alignment, whole-track and windowed.
//! - **drift**: Windowed drift scan and drift-point/segment synthesis.
//! - **compensate**: Compensation planning and edit-plan rendering.

pub mod align;
pub mod compensate;
pub mod drift;
pub mod error;
pub mod models;
pub mod onset;
pub mod pcm_io;

pub use error::{AudioSyncError, Result};
pub use models::*;
