//! Windowed drift detection.
//!
//! Scans the main timeline in overlapping or back-to-back windows, takes an
//! alignment measurement per window, and reports the points where the
//! measured offset jumps by more than a threshold — each jump usually marks
//! a cut between differently-sourced clips in the secondary track.

use log::{info, warn};
use rayon::prelude::*;

use crate::align::align_segment;
use crate::error::AudioSyncError;
use crate::models::{
    AudioSegment, CancelToken, DriftPoint, DriftReport, DriftScanConfig, Measurement,
    ProgressCallback,
};
use crate::pcm_io::probe_duration_ms;

/// Run a full windowed drift scan between `main_path` and `secondary_path`.
pub fn detect_drift(
    main_path: &str,
    secondary_path: &str,
    config: DriftScanConfig,
    progress: Option<&ProgressCallback>,
    cancel: Option<&CancelToken>,
) -> Result<DriftReport, AudioSyncError> {
    let start = std::time::Instant::now();

    let main_duration_ms = probe_duration_ms(main_path)?;
    // Existence of the secondary file is confirmed by the first window's load;
    // probing it up front gives a clearer error before any work is dispatched.
    probe_duration_ms(secondary_path)?;

    let mut window_starts = Vec::new();
    let mut position_ms = 0.0;
    while position_ms + config.window_ms <= main_duration_ms {
        window_starts.push(position_ms);
        position_ms += config.step_ms;
    }

    if window_starts.is_empty() {
        return Ok(DriftReport {
            drift_points: Vec::new(),
            segments: Vec::new(),
            scan_duration_seconds: start.elapsed().as_secs_f64(),
        });
    }

    if crate::models::is_cancelled(cancel) {
        return Err(AudioSyncError::Cancelled);
    }

    let total = window_starts.len();
    let dispatch = |window_starts: Vec<f64>| {
        window_starts
            .into_par_iter()
            .enumerate()
            .map(|(i, window_start)| {
                let result = align_segment(
                    main_path,
                    secondary_path,
                    window_start,
                    window_start + config.window_ms,
                )?;
                if let Some(cb) = progress {
                    cb(i + 1, total, "scanning for drift");
                }
                Ok(Measurement {
                    window_start_ms: window_start,
                    offset_ms: result.offset_ms,
                    confidence: result.confidence,
                })
            })
            .collect::<Result<Vec<_>, AudioSyncError>>()
    };

    let measurements: Vec<Measurement> = match config.max_workers {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| AudioSyncError::IoFailed {
                    path: main_path.to_string(),
                    detail: format!("failed to build drift scan thread pool: {e}"),
                })?;
            pool.install(|| dispatch(window_starts))?
        }
        None => dispatch(window_starts)?,
    };

    if crate::models::is_cancelled(cancel) {
        return Err(AudioSyncError::Cancelled);
    }

    let mut drift_points = Vec::new();
    for window in measurements.windows(2) {
        let prev = window[0];
        let curr = window[1];
        let offset_change = (curr.offset_ms - prev.offset_ms).abs();
        if offset_change >= config.drift_threshold_ms {
            let timestamp_ms =
                (prev.window_start_ms + curr.window_start_ms + config.window_ms) / 2.0;
            warn!(
                "drift @ {:.0}ms: {:+.1}ms -> {:+.1}ms (threshold {:.0}ms)",
                timestamp_ms, prev.offset_ms, curr.offset_ms, config.drift_threshold_ms
            );
            drift_points.push(DriftPoint {
                timestamp_ms,
                offset_before_ms: prev.offset_ms,
                offset_after_ms: curr.offset_ms,
                confidence: prev.confidence.min(curr.confidence),
            });
        }
    }

    let segments = build_segments(&measurements, &drift_points, main_duration_ms);
    let elapsed = start.elapsed().as_secs_f64();
    info!(
        "drift scan of {:.0}ms in {:.2}s: {} drift point(s), {} segment(s)",
        main_duration_ms,
        elapsed,
        drift_points.len(),
        segments.len()
    );

    Ok(DriftReport {
        drift_points,
        segments,
        scan_duration_seconds: elapsed,
    })
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn build_segments(
    measurements: &[Measurement],
    drift_points: &[DriftPoint],
    main_duration_ms: f64,
) -> Vec<AudioSegment> {
    if drift_points.is_empty() {
        let mut offsets: Vec<f64> = measurements.iter().map(|m| m.offset_ms).collect();
        let confidences: Vec<f64> = measurements.iter().map(|m| m.confidence).collect();
        return vec![AudioSegment {
            start_time_ms: 0.0,
            end_time_ms: main_duration_ms,
            offset_ms: median(&mut offsets),
            confidence: mean(&confidences),
        }];
    }

    let mut segments = Vec::with_capacity(drift_points.len() + 1);
    let mut segment_start = 0.0;

    for drift in drift_points {
        let bucket: Vec<&Measurement> = measurements
            .iter()
            .filter(|m| m.window_start_ms >= segment_start && m.window_start_ms < drift.timestamp_ms)
            .collect();

        let (offset, confidence) = if bucket.is_empty() {
            (drift.offset_before_ms, drift.confidence)
        } else {
            let mut offsets: Vec<f64> = bucket.iter().map(|m| m.offset_ms).collect();
            let confidences: Vec<f64> = bucket.iter().map(|m| m.confidence).collect();
            (median(&mut offsets), mean(&confidences))
        };

        segments.push(AudioSegment {
            start_time_ms: segment_start,
            end_time_ms: drift.timestamp_ms,
            offset_ms: offset,
            confidence,
        });
        segment_start = drift.timestamp_ms;
    }

    let last = drift_points.last().unwrap();
    let tail: Vec<&Measurement> = measurements
        .iter()
        .filter(|m| m.window_start_ms >= last.timestamp_ms)
        .collect();
    let (offset, confidence) = if tail.is_empty() {
        (last.offset_after_ms, last.confidence)
    } else {
        let mut offsets: Vec<f64> = tail.iter().map(|m| m.offset_ms).collect();
        let confidences: Vec<f64> = tail.iter().map(|m| m.confidence).collect();
        (median(&mut offsets), mean(&confidences))
    };
    segments.push(AudioSegment {
        start_time_ms: segment_start,
        end_time_ms: main_duration_ms,
        offset_ms: offset,
        confidence,
    });

    segments
}
