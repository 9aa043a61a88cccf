//! Data models for the dubsync alignment engine.
//!
//! Mirrors the original Python `alignment.py` / `schemas.py` data structures.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Analysis sample rate — fixed mono rate used for every envelope and PCM op.
pub const ANALYSIS_SAMPLE_RATE_HZ: u32 = 22_050;

/// Analysis hop, in samples.
pub const HOP_SAMPLES: u32 = 512;

/// Default drift-scan window duration, in milliseconds.
pub const DEFAULT_DRIFT_WINDOW_MS: f64 = 30_000.0;

/// Default drift-scan step, in milliseconds.
pub const DEFAULT_DRIFT_STEP_MS: f64 = 15_000.0;

/// Default minimum offset change that counts as drift, in milliseconds.
pub const DEFAULT_DRIFT_THRESHOLD_MS: f64 = 500.0;

/// Calibration constant for the confidence formula (see `align::align`).
pub const CONFIDENCE_CALIBRATION_DIVISOR: f64 = 10.0;

/// Default crossfade duration applied at edit-plan boundaries, in milliseconds.
pub const DEFAULT_CROSSFADE_MS: f64 = 50.0;

// ---------------------------------------------------------------------------
//  Cancellation & progress
// ---------------------------------------------------------------------------

/// Cancellation token — shared atomic bool for cooperative cancellation.
pub type CancelToken = Arc<AtomicBool>;

/// Create a new cancellation token.
pub fn new_cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// Returns `true` if the token has been set.
pub fn is_cancelled(cancel: Option<&CancelToken>) -> bool {
    cancel.is_some_and(|t| t.load(Ordering::Relaxed))
}

/// Progress callback type: (current_step, total_steps, message).
pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

// ---------------------------------------------------------------------------
//  Core alignment types
// ---------------------------------------------------------------------------

/// A mono PCM buffer at the fixed analysis sample rate.
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl PcmBuffer {
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

/// A normalized onset-strength time series, one value per analysis hop.
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    pub frames: Vec<f32>,
    pub hop_samples: u32,
    pub sample_rate_hz: u32,
}

impl OnsetEnvelope {
    pub fn frame_period_s(&self) -> f64 {
        self.hop_samples as f64 / self.sample_rate_hz as f64
    }

    /// An envelope is degenerate when there's nothing to correlate against:
    /// empty, a single frame, or every frame is zero.
    pub fn is_degenerate(&self) -> bool {
        self.frames.len() < 2 || self.frames.iter().all(|&f| f == 0.0)
    }
}

/// Result of a single alignment measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub offset_ms: f64,
    pub confidence: f64,
}

impl AlignmentResult {
    pub const ZERO: AlignmentResult = AlignmentResult {
        offset_ms: 0.0,
        confidence: 0.0,
    };
}

/// A single windowed measurement taken by the drift detector.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Measurement {
    pub window_start_ms: f64,
    pub offset_ms: f64,
    pub confidence: f64,
}

/// A point on the main timeline where the alignment offset jumps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftPoint {
    pub timestamp_ms: f64,
    pub offset_before_ms: f64,
    pub offset_after_ms: f64,
    pub confidence: f64,
}

/// A maximal contiguous range of the main timeline sharing one offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub start_time_ms: f64,
    pub end_time_ms: f64,
    pub offset_ms: f64,
    pub confidence: f64,
}

impl AudioSegment {
    pub fn duration_ms(&self) -> f64 {
        self.end_time_ms - self.start_time_ms
    }
}

/// Result of a full drift scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_points: Vec<DriftPoint>,
    pub segments: Vec<AudioSegment>,
    pub scan_duration_seconds: f64,
}

/// A single edit operation in a compensation plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditOp {
    CopyRange { src_start_ms: f64, src_end_ms: f64 },
    Silence { duration_ms: f64 },
}

impl EditOp {
    pub fn duration_ms(&self) -> f64 {
        match *self {
            EditOp::CopyRange {
                src_start_ms,
                src_end_ms,
            } => src_end_ms - src_start_ms,
            EditOp::Silence { duration_ms } => duration_ms,
        }
    }
}

/// An ordered sequence of edit operations over the secondary audio.
#[derive(Debug, Clone, Default)]
pub struct EditPlan {
    pub ops: Vec<EditOp>,
}

impl EditPlan {
    pub fn total_duration_ms(&self) -> f64 {
        self.ops.iter().map(EditOp::duration_ms).sum()
    }
}

/// Totals accumulated while building a compensation plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTotals {
    pub total_silence_ms: f64,
    pub total_trimmed_ms: f64,
}

/// Result of rendering an edit plan to PCM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub total_silence_ms: f64,
    pub total_trimmed_ms: f64,
}

// ---------------------------------------------------------------------------
//  Config
// ---------------------------------------------------------------------------

/// Tunables for the windowed drift scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriftScanConfig {
    pub window_ms: f64,
    pub step_ms: f64,
    pub drift_threshold_ms: f64,
    /// Drift scan concurrency cap. `None` uses rayon's global pool default.
    pub max_workers: Option<usize>,
}

impl Default for DriftScanConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_DRIFT_WINDOW_MS,
            step_ms: DEFAULT_DRIFT_STEP_MS,
            drift_threshold_ms: DEFAULT_DRIFT_THRESHOLD_MS,
            max_workers: None,
        }
    }
}

/// Tunables for the compensation renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompensateConfig {
    pub crossfade_ms: f64,
}

impl Default for CompensateConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: DEFAULT_CROSSFADE_MS,
        }
    }
}

/// An optional `[offset_s, duration_s)` window for the PCM loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadRange {
    pub offset_s: Option<f64>,
    pub duration_s: Option<f64>,
}
