//! Onset-envelope cross-correlation alignment.
//!
//! 1. Build an onset-strength envelope for each track.
//! 2. Cross-correlate the two envelopes with a zero-padded FFT (linear, not
//!    circular, correlation).
//! 3. The lag of the correlation peak converts directly to a millisecond
//!    offset; the ratio of peak to mean correlation gives a confidence score.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::error::AudioSyncError;
use crate::models::{
    AlignmentResult, LoadRange, OnsetEnvelope, CONFIDENCE_CALIBRATION_DIVISOR, HOP_SAMPLES,
};
use crate::onset;
use crate::pcm_io;

/// Cross-correlate two onset envelopes and report the offset of `env_secondary`
/// relative to `env_main`, with a calibrated confidence score.
///
/// A degenerate envelope on either side (too short, or silent) yields a
/// zero-confidence, zero-offset result rather than an error — there is
/// nothing meaningful to correlate against.
pub fn align(env_main: &OnsetEnvelope, env_secondary: &OnsetEnvelope) -> AlignmentResult {
    if env_main.is_degenerate() || env_secondary.is_degenerate() {
        return AlignmentResult::ZERO;
    }

    let main = normalize(&env_main.frames);
    let secondary = normalize(&env_secondary.frames);

    let correlation = fft_correlate(&main, &secondary);

    let center = secondary.len() as i64 - 1;
    let peak_idx = argmax(&correlation, center);
    let lag_frames = peak_idx as i64 - center;

    let frame_period_s = env_main.frame_period_s();
    let offset_ms = lag_frames as f64 * frame_period_s * 1000.0;

    let max_corr = correlation[peak_idx] as f64;
    let mean_abs_corr: f64 =
        correlation.iter().map(|&x| x.abs() as f64).sum::<f64>() / correlation.len() as f64;

    let confidence = if mean_abs_corr > 0.0 {
        (max_corr / mean_abs_corr / CONFIDENCE_CALIBRATION_DIVISOR).min(1.0)
    } else {
        0.0
    };

    AlignmentResult {
        offset_ms,
        confidence,
    }
}

/// Align a `[start_ms, end_ms)` window of two tracks.
///
/// Missing input files are reported as errors; a window too short to carry
/// two onset-analysis frames on either side collapses to a zero result
/// rather than failing the whole scan.
pub fn align_segment(
    main_path: &str,
    secondary_path: &str,
    start_ms: f64,
    end_ms: f64,
) -> Result<AlignmentResult, AudioSyncError> {
    let range = LoadRange {
        offset_s: Some(start_ms / 1000.0),
        duration_s: Some((end_ms - start_ms) / 1000.0),
    };

    let main_pcm = match pcm_io::load(main_path, range) {
        Ok(pcm) => pcm,
        Err(e @ AudioSyncError::InputMissing { .. }) => return Err(e),
        Err(_) => return Ok(AlignmentResult::ZERO),
    };
    let secondary_pcm = match pcm_io::load(secondary_path, range) {
        Ok(pcm) => pcm,
        Err(e @ AudioSyncError::InputMissing { .. }) => return Err(e),
        Err(_) => return Ok(AlignmentResult::ZERO),
    };

    let min_len = (HOP_SAMPLES as usize) * 2;
    if main_pcm.samples.len() < min_len || secondary_pcm.samples.len() < min_len {
        return Ok(AlignmentResult::ZERO);
    }

    let env_main = onset::envelope(&main_pcm, HOP_SAMPLES);
    let env_secondary = onset::envelope(&secondary_pcm, HOP_SAMPLES);

    Ok(align(&env_main, &env_secondary))
}

fn normalize(frames: &[f32]) -> Vec<f32> {
    let peak = frames.iter().cloned().fold(0.0f32, f32::max);
    if peak > 0.0 {
        frames.iter().map(|&f| f / peak).collect()
    } else {
        frames.to_vec()
    }
}

/// Index of the correlation peak, with ties broken by smallest `|k - center|`
/// and then smallest `k`.
fn argmax(values: &[f32], center: i64) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    let mut best_dist = i64::MAX;
    for (i, &v) in values.iter().enumerate() {
        let dist = (i as i64 - center).abs();
        let better = v > best_val
            || (v == best_val && (dist < best_dist || (dist == best_dist && (i as i64) < best_idx as i64)));
        if better {
            best_val = v;
            best_idx = i;
            best_dist = dist;
        }
    }
    best_idx
}

/// Linear FFT cross-correlation, equivalent to `scipy.signal.correlate(a, b, "full")`.
fn fft_correlate(a: &[f32], b: &[f32]) -> Vec<f32> {
    let n = a.len() + b.len() - 1;
    let fft_len = n.next_power_of_two();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut a_c: Vec<Complex<f32>> = a.iter().map(|&x| Complex::new(x, 0.0)).collect();
    a_c.resize(fft_len, Complex::new(0.0, 0.0));

    // Correlation via convolution with the reversed second signal.
    let mut b_c: Vec<Complex<f32>> = b.iter().rev().map(|&x| Complex::new(x, 0.0)).collect();
    b_c.resize(fft_len, Complex::new(0.0, 0.0));

    fft.process(&mut a_c);
    fft.process(&mut b_c);

    let mut product: Vec<Complex<f32>> = a_c.iter().zip(b_c.iter()).map(|(x, y)| x * y).collect();

    ifft.process(&mut product);

    let norm = 1.0 / fft_len as f32;
    product.iter().take(n).map(|c| c.re * norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ANALYSIS_SAMPLE_RATE_HZ;

    fn env(frames: Vec<f32>) -> OnsetEnvelope {
        OnsetEnvelope {
            frames,
            hop_samples: HOP_SAMPLES,
            sample_rate_hz: ANALYSIS_SAMPLE_RATE_HZ,
        }
    }

    #[test]
    fn test_align_identical_envelopes_zero_offset() {
        let frames = vec![0.0, 0.2, 1.0, 0.3, 0.1, 0.0, 0.0, 0.8, 0.4];
        let result = align(&env(frames.clone()), &env(frames));
        assert_eq!(result.offset_ms, 0.0);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_align_shifted_envelope_positive_lag() {
        let mut main = vec![0.0; 20];
        main[10] = 1.0;
        let mut secondary = vec![0.0; 20];
        secondary[7] = 1.0;

        let result = align(&env(main), &env(secondary));
        let frame_period_ms = (HOP_SAMPLES as f64 / ANALYSIS_SAMPLE_RATE_HZ as f64) * 1000.0;
        assert!((result.offset_ms - 3.0 * frame_period_ms).abs() < 1e-6);
    }

    #[test]
    fn test_align_degenerate_main_yields_zero() {
        let result = align(&env(vec![]), &env(vec![0.0, 1.0, 0.3]));
        assert_eq!(result, AlignmentResult::ZERO);
    }

    #[test]
    fn test_align_silent_envelopes_yield_zero() {
        let result = align(&env(vec![0.0, 0.0, 0.0]), &env(vec![0.0, 0.0, 0.0]));
        assert_eq!(result, AlignmentResult::ZERO);
    }

    #[test]
    fn test_align_segment_missing_main_file() {
        let err = align_segment("/no/such/main.wav", "/no/such/sec.wav", 0.0, 1000.0)
            .unwrap_err();
        assert!(matches!(err, AudioSyncError::InputMissing { .. }));
    }

    #[test]
    fn test_argmax_tie_break_prefers_smallest_distance_to_center() {
        // center = 2: index 1 is distance 1 away, index 3 is distance 1 away too;
        // smallest index wins the remaining tie.
        assert_eq!(argmax(&[0.0, 2.0, 1.0, 2.0, 0.0], 2), 1);
    }

    #[test]
    fn test_argmax_tie_break_prefers_closer_index_over_earlier_one() {
        // center = 3: index 1 is distance 2 away, index 4 is distance 1 away;
        // index 4 should win despite coming later.
        assert_eq!(argmax(&[0.0, 2.0, 0.0, 0.0, 2.0], 3), 4);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let mut main = vec![0.0; 5];
        main[2] = 1000.0;
        let mut secondary = vec![0.0; 5];
        secondary[2] = 1000.0;
        let result = align(&env(main), &env(secondary));
        assert!(result.confidence <= 1.0);
    }
}
