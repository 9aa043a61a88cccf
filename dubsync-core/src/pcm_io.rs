//! PCM I/O — strict-format WAV loading and writing.
//!
//! Every file this crate touches is RIFF/WAV, PCM signed 16-bit little-endian,
//! mono, 22050 Hz. Anything else is rejected rather than resampled or
//! remixed, so a caller always knows exactly what they fed the aligner.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::error::AudioSyncError;
use crate::models::{PcmBuffer, ANALYSIS_SAMPLE_RATE_HZ, LoadRange};

/// Validate that a WAV spec matches the fixed analysis format.
fn validate_spec(path: &str, spec: &WavSpec) -> Result<(), AudioSyncError> {
    if spec.channels != 1 {
        return Err(AudioSyncError::UnsupportedFormat {
            path: path.to_string(),
            detail: format!("expected mono, found {} channels", spec.channels),
        });
    }
    if spec.sample_rate != ANALYSIS_SAMPLE_RATE_HZ {
        return Err(AudioSyncError::UnsupportedFormat {
            path: path.to_string(),
            detail: format!(
                "expected {} Hz, found {} Hz",
                ANALYSIS_SAMPLE_RATE_HZ, spec.sample_rate
            ),
        });
    }
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(AudioSyncError::UnsupportedFormat {
            path: path.to_string(),
            detail: "expected PCM signed 16-bit".to_string(),
        });
    }
    Ok(())
}

fn open_reader(path: &str) -> Result<WavReader<std::io::BufReader<std::fs::File>>, AudioSyncError> {
    if !Path::new(path).exists() {
        return Err(AudioSyncError::InputMissing {
            path: path.to_string(),
        });
    }
    WavReader::open(path).map_err(|e| AudioSyncError::DecodeFailed {
        path: path.to_string(),
        detail: e.to_string(),
    })
}

/// Load a fixed-format mono PCM16 WAV file, optionally restricted to an
/// `[offset_s, offset_s + duration_s)` window.
///
/// A `duration_s` that runs past end of file is truncated rather than
/// rejected; a window that resolves to zero samples returns `RangeEmpty`.
pub fn load(path: &str, range: LoadRange) -> Result<PcmBuffer, AudioSyncError> {
    let mut reader = open_reader(path)?;
    let spec = reader.spec();
    validate_spec(path, &spec)?;

    let total_samples = reader.duration() as usize;
    let sr = spec.sample_rate as f64;

    let start_sample = range
        .offset_s
        .map(|s| (s * sr).round() as i64)
        .unwrap_or(0)
        .max(0) as usize;

    let end_sample = match range.duration_s {
        Some(d) => (start_sample + (d * sr).round() as usize).min(total_samples),
        None => total_samples,
    };

    if start_sample >= total_samples || end_sample <= start_sample {
        return Err(AudioSyncError::RangeEmpty {
            path: path.to_string(),
            start_ms: range.offset_s.unwrap_or(0.0) * 1000.0,
            end_ms: (range.offset_s.unwrap_or(0.0) + range.duration_s.unwrap_or(0.0)) * 1000.0,
        });
    }

    let max_val = (1i32 << 15) as f32;
    let mut samples = Vec::with_capacity(end_sample - start_sample);
    for (i, s) in reader.samples::<i32>().enumerate() {
        if i >= end_sample {
            break;
        }
        let s = s.map_err(|e| AudioSyncError::DecodeFailed {
            path: path.to_string(),
            detail: e.to_string(),
        })?;
        if i >= start_sample {
            samples.push(s as f32 / max_val);
        }
    }

    debug!(
        "loaded {} samples from {} [{}..{})",
        samples.len(),
        path,
        start_sample,
        end_sample
    );

    Ok(PcmBuffer {
        samples,
        sample_rate_hz: spec.sample_rate,
    })
}

/// Probe a WAV file's duration in milliseconds without decoding any samples.
pub fn probe_duration_ms(path: &str) -> Result<f64, AudioSyncError> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    validate_spec(path, &spec)?;
    let frames = reader.duration() as f64;
    Ok(frames / spec.sample_rate as f64 * 1000.0)
}

/// Create a new mono PCM16 WAV writer at `path`.
///
/// Fails with `IoFailed` if `path` already exists — renders always produce a
/// fresh file, never overwrite one in place.
pub fn create_writer(path: &str) -> Result<WavWriter<std::io::BufWriter<std::fs::File>>, AudioSyncError> {
    if Path::new(path).exists() {
        return Err(AudioSyncError::IoFailed {
            path: path.to_string(),
            detail: "output file already exists".to_string(),
        });
    }
    let spec = WavSpec {
        channels: 1,
        sample_rate: ANALYSIS_SAMPLE_RATE_HZ,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    WavWriter::create(path, spec).map_err(|e| AudioSyncError::IoFailed {
        path: path.to_string(),
        detail: e.to_string(),
    })
}

/// Write one f32 sample in `[-1.0, 1.0]` as signed 16-bit PCM.
pub fn write_sample(
    writer: &mut WavWriter<std::io::BufWriter<std::fs::File>>,
    path: &str,
    value: f32,
) -> Result<(), AudioSyncError> {
    let clamped = value.clamp(-1.0, 1.0);
    let quantized = (clamped * i16::MAX as f32).round() as i16;
    writer
        .write_sample(quantized)
        .map_err(|e| AudioSyncError::IoFailed {
            path: path.to_string(),
            detail: e.to_string(),
        })
}
