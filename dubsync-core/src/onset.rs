//! Onset-strength envelope extraction.
//!
//! Converts raw PCM into a coarse time series of "how much new spectral
//! energy just appeared" — the signal the aligner cross-correlates instead
//! of raw waveform samples, since onset strength survives recompression and
//! loudness differences between the two tracks far better than amplitude
//! does.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::models::{OnsetEnvelope, PcmBuffer};

/// Build a Hann window of the given length.
fn hann_window(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32).cos()))
        .collect()
}

/// Compute a normalized onset-strength envelope from `pcm` using an analysis
/// frame of `2 * hop_samples` and a hop of `hop_samples`.
///
/// Each frame is Hann-windowed, transformed, and compared against the
/// magnitude spectrum of the previous frame via half-wave-rectified spectral
/// flux. The resulting series is normalized by its own maximum so that two
/// envelopes recorded at different gain levels remain comparable.
pub fn envelope(pcm: &PcmBuffer, hop_samples: u32) -> OnsetEnvelope {
    let hop = hop_samples as usize;
    let frame_len = hop * 2;

    if pcm.samples.len() < frame_len {
        return OnsetEnvelope {
            frames: Vec::new(),
            hop_samples,
            sample_rate_hz: pcm.sample_rate_hz,
        };
    }

    let window = hann_window(frame_len);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_len);

    let mut prev_spectrum = vec![0.0f32; frame_len / 2 + 1];
    let mut frames = Vec::new();

    let mut start = 0;
    while start + frame_len <= pcm.samples.len() {
        let mut buffer: Vec<Complex<f32>> = pcm.samples[start..start + frame_len]
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();

        fft.process(&mut buffer);

        let spectrum: Vec<f32> = buffer[..frame_len / 2 + 1].iter().map(|c| c.norm()).collect();

        let flux: f32 = spectrum
            .iter()
            .zip(prev_spectrum.iter())
            .map(|(curr, prev)| (curr - prev).max(0.0))
            .sum();

        frames.push(flux);
        prev_spectrum = spectrum;
        start += hop;
    }

    let peak = frames.iter().cloned().fold(0.0f32, f32::max);
    if peak > 0.0 {
        for f in frames.iter_mut() {
            *f /= peak;
        }
    }

    OnsetEnvelope {
        frames,
        hop_samples,
        sample_rate_hz: pcm.sample_rate_hz,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ANALYSIS_SAMPLE_RATE_HZ;

    fn impulse_buffer(len: usize, impulse_at: usize) -> PcmBuffer {
        let mut samples = vec![0.0f32; len];
        if impulse_at < len {
            samples[impulse_at] = 1.0;
        }
        PcmBuffer {
            samples,
            sample_rate_hz: ANALYSIS_SAMPLE_RATE_HZ,
        }
    }

    #[test]
    fn test_envelope_too_short_is_empty() {
        let pcm = PcmBuffer {
            samples: vec![0.0; 100],
            sample_rate_hz: ANALYSIS_SAMPLE_RATE_HZ,
        };
        let env = envelope(&pcm, 512);
        assert!(env.frames.is_empty());
        assert!(env.is_degenerate());
    }

    #[test]
    fn test_envelope_silence_is_degenerate() {
        let pcm = PcmBuffer {
            samples: vec![0.0; 22_050],
            sample_rate_hz: ANALYSIS_SAMPLE_RATE_HZ,
        };
        let env = envelope(&pcm, 512);
        assert!(env.is_degenerate());
    }

    #[test]
    fn test_envelope_normalized_to_unit_peak() {
        let pcm = impulse_buffer(22_050, 11_000);
        let env = envelope(&pcm, 512);
        assert!(!env.is_degenerate());
        let peak = env.frames.iter().cloned().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_envelope_frame_period() {
        let pcm = impulse_buffer(22_050, 11_000);
        let env = envelope(&pcm, 512);
        assert!((env.frame_period_s() - 512.0 / 22_050.0).abs() < 1e-12);
    }

    #[test]
    fn test_envelope_monotone_hop_count() {
        let pcm = PcmBuffer {
            samples: vec![0.1; 44_100],
            sample_rate_hz: ANALYSIS_SAMPLE_RATE_HZ,
        };
        let hop = 512usize;
        let env = envelope(&pcm, hop as u32);
        let expected = (pcm.samples.len() - hop * 2) / hop + 1;
        assert_eq!(env.frames.len(), expected);
    }
}
