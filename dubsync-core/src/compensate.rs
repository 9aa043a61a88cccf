//! Compensation planning and rendering.
//!
//! Turns a sequence of aligned segments into an edit plan over the secondary
//! track — silence where the secondary fell behind, trims where it ran
//! ahead — then renders that plan to a new PCM file, sample-accurately and
//! with an optional crossfade at each boundary.

use log::{info, warn};

use crate::error::AudioSyncError;
use crate::models::{AudioSegment, EditOp, EditPlan, PlanTotals, RenderReport, ANALYSIS_SAMPLE_RATE_HZ};
use crate::pcm_io;

/// Build an edit plan that compensates the secondary track for the offset
/// changes recorded in `segments`.
///
/// `adjust_ms = prev.offset_ms - prev_segment_curr.offset_ms` at each
/// boundary: a positive adjustment means the secondary needs silence
/// inserted (it is running short); a negative one means content must be
/// trimmed (it is running ahead). A boundary whose trim would consume more
/// than the available source range is infeasible.
pub fn plan(
    segments: &[AudioSegment],
    secondary_duration_ms: f64,
) -> Result<(EditPlan, PlanTotals), AudioSyncError> {
    let mut ops = Vec::new();
    let mut totals = PlanTotals::default();

    if segments.is_empty() {
        return Ok((EditPlan { ops }, totals));
    }

    let mut sorted: Vec<AudioSegment> = segments.to_vec();
    sorted.sort_by(|a, b| a.start_time_ms.partial_cmp(&b.start_time_ms).unwrap());
    let segments = &sorted[..];

    if segments.len() == 1 {
        // No drift was detected, so there is nothing to re-sync within the
        // file: the segment's own offset is a constant shift applied
        // downstream, not something this plan edits for.
        let seg = &segments[0];
        if seg.end_time_ms <= 0.0 {
            warn!("plan infeasible at boundary {:.0}ms: degenerate single segment", seg.start_time_ms);
            return Err(AudioSyncError::PlanInfeasible {
                boundary_start_ms: seg.start_time_ms,
            });
        }
        ops.push(EditOp::CopyRange {
            src_start_ms: 0.0,
            src_end_ms: seg.end_time_ms,
        });
        info!("compensation plan: 1 op, no drift to compensate");
        return Ok((EditPlan { ops }, totals));
    }

    // Cursor into the secondary track, in secondary-track time.
    let first = &segments[0];
    let mut cursor_ms = first.start_time_ms + first.offset_ms;

    for window in segments.windows(2) {
        let curr = &window[0];
        let next = &window[1];

        let src_start = cursor_ms;
        let src_end = curr.end_time_ms + curr.offset_ms;
        if src_end <= src_start {
            warn!(
                "plan infeasible at boundary {:.0}ms: trim collapses source range",
                curr.start_time_ms
            );
            return Err(AudioSyncError::PlanInfeasible {
                boundary_start_ms: curr.start_time_ms,
            });
        }
        ops.push(EditOp::CopyRange {
            src_start_ms: src_start,
            src_end_ms: src_end,
        });
        cursor_ms = src_end;

        let adjust_ms = curr.offset_ms - next.offset_ms;
        if adjust_ms > 0.0 {
            ops.push(EditOp::Silence {
                duration_ms: adjust_ms,
            });
            totals.total_silence_ms += adjust_ms;
        } else if adjust_ms < 0.0 {
            let trim = -adjust_ms;
            cursor_ms += trim;
            totals.total_trimmed_ms += trim;
        }
    }

    let last = segments.last().unwrap();
    let src_start = cursor_ms;
    let src_end = (last.end_time_ms + last.offset_ms).min(secondary_duration_ms);
    if src_end <= src_start {
        warn!(
            "plan infeasible at boundary {:.0}ms: tail trim exceeds available source",
            last.start_time_ms
        );
        return Err(AudioSyncError::PlanInfeasible {
            boundary_start_ms: last.start_time_ms,
        });
    }
    ops.push(EditOp::CopyRange {
        src_start_ms: src_start,
        src_end_ms: src_end,
    });

    info!(
        "compensation plan: {} op(s), {:.1}ms silence, {:.1}ms trimmed",
        ops.len(),
        totals.total_silence_ms,
        totals.total_trimmed_ms
    );
    Ok((EditPlan { ops }, totals))
}

/// Converts a millisecond offset to a sample count, rounding half to even so
/// that boundary error doesn't accumulate in one direction across many
/// consecutive ops.
fn ms_to_samples(ms: f64) -> usize {
    (ms / 1000.0 * ANALYSIS_SAMPLE_RATE_HZ as f64).round_ties_even() as usize
}

/// Render an edit plan to a fresh PCM16 WAV file.
///
/// Boundaries between a `CopyRange` and an adjacent `Silence` or
/// `CopyRange` get a linear-in-amplitude crossfade of `crossfade_ms`,
/// centered on the nominal boundary, when both sides have enough samples to
/// support it.
pub fn render(
    plan: &EditPlan,
    totals: &PlanTotals,
    src_path: &str,
    out_path: &str,
    crossfade_ms: f64,
) -> Result<RenderReport, AudioSyncError> {
    let src = pcm_io::load(src_path, crate::models::LoadRange::default())?;

    let mut rendered: Vec<f32> = Vec::new();
    for op in &plan.ops {
        match *op {
            EditOp::CopyRange {
                src_start_ms,
                src_end_ms,
            } => {
                let start = ms_to_samples(src_start_ms).min(src.samples.len());
                let end = ms_to_samples(src_end_ms).min(src.samples.len());
                if end > start {
                    rendered.extend_from_slice(&src.samples[start..end]);
                }
            }
            EditOp::Silence { duration_ms } => {
                rendered.extend(std::iter::repeat(0.0f32).take(ms_to_samples(duration_ms)));
            }
        }
    }

    apply_crossfades(&mut rendered, plan, crossfade_ms);

    let mut writer = pcm_io::create_writer(out_path)?;
    for &sample in &rendered {
        pcm_io::write_sample(&mut writer, out_path, sample)?;
    }
    writer
        .finalize()
        .map_err(|e| AudioSyncError::IoFailed {
            path: out_path.to_string(),
            detail: e.to_string(),
        })?;

    info!(
        "rendered {} to {}: {:.1}ms silence inserted, {:.1}ms trimmed, {} sample(s)",
        src_path,
        out_path,
        totals.total_silence_ms,
        totals.total_trimmed_ms,
        rendered.len()
    );

    Ok(RenderReport {
        total_silence_ms: totals.total_silence_ms,
        total_trimmed_ms: totals.total_trimmed_ms,
    })
}

/// Apply a linear-in-amplitude crossfade at each internal boundary of the
/// rendered plan, in place.
fn apply_crossfades(rendered: &mut [f32], plan: &EditPlan, crossfade_ms: f64) {
    if crossfade_ms <= 0.0 || plan.ops.len() < 2 {
        return;
    }
    let half = ms_to_samples(crossfade_ms / 2.0);
    if half == 0 {
        return;
    }

    let mut boundary = 0usize;
    for window in plan.ops.windows(2) {
        boundary += ms_to_samples(window[0].duration_ms());

        let lo = boundary.saturating_sub(half);
        let hi = (boundary + half).min(rendered.len());
        if hi <= lo || boundary == 0 || boundary >= rendered.len() {
            continue;
        }

        let span = hi - lo;
        for (i, sample_idx) in (lo..hi).enumerate() {
            let t = i as f32 / span as f32;
            let fade_out = 1.0 - t;
            let fade_in = t;
            if sample_idx < boundary {
                rendered[sample_idx] *= fade_out;
            } else {
                rendered[sample_idx] *= fade_in;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    fn write_wav(path: &str, samples: &[f32]) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: ANALYSIS_SAMPLE_RATE_HZ,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn seg(start: f64, end: f64, offset: f64) -> AudioSegment {
        AudioSegment {
            start_time_ms: start,
            end_time_ms: end,
            offset_ms: offset,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_plan_single_segment() {
        // No drift detected means no re-sync edits are needed — the
        // segment's nonzero offset is a whole-stream shift applied
        // downstream, not something the plan trims or delays for.
        let segments = vec![seg(0.0, 10_000.0, 500.0)];
        let (edit_plan, totals) = plan(&segments, 20_000.0).unwrap();
        assert_eq!(edit_plan.ops.len(), 1);
        assert_eq!(totals, PlanTotals::default());
        match edit_plan.ops[0] {
            EditOp::CopyRange {
                src_start_ms,
                src_end_ms,
            } => {
                assert_eq!(src_start_ms, 0.0);
                assert_eq!(src_end_ms, 10_000.0);
            }
            _ => panic!("expected CopyRange"),
        }
    }

    #[test]
    fn test_plan_inserts_silence_when_secondary_runs_short() {
        let segments = vec![seg(0.0, 10_000.0, 1_000.0), seg(10_000.0, 20_000.0, 1_500.0)];
        let (edit_plan, totals) = plan(&segments, 30_000.0).unwrap();
        assert!(totals.total_silence_ms > 0.0);
        assert!(edit_plan
            .ops
            .iter()
            .any(|op| matches!(op, EditOp::Silence { .. })));
    }

    #[test]
    fn test_plan_trims_when_secondary_runs_ahead() {
        let segments = vec![seg(0.0, 10_000.0, 1_500.0), seg(10_000.0, 20_000.0, 1_000.0)];
        let (_edit_plan, totals) = plan(&segments, 30_000.0).unwrap();
        assert!(totals.total_trimmed_ms > 0.0);
        assert_eq!(totals.total_silence_ms, 0.0);
    }

    #[test]
    fn test_plan_sorts_out_of_order_segments_defensively() {
        let forward = vec![seg(0.0, 10_000.0, 1_000.0), seg(10_000.0, 20_000.0, 1_500.0)];
        let reversed = vec![seg(10_000.0, 20_000.0, 1_500.0), seg(0.0, 10_000.0, 1_000.0)];
        let (plan_forward, totals_forward) = plan(&forward, 30_000.0).unwrap();
        let (plan_reversed, totals_reversed) = plan(&reversed, 30_000.0).unwrap();
        assert_eq!(plan_forward.ops, plan_reversed.ops);
        assert_eq!(totals_forward, totals_reversed);
    }

    #[test]
    fn test_plan_infeasible_when_range_collapses() {
        // The second boundary demands a 50s trim, but the secondary track is
        // only 20s long — the tail CopyRange would start past its own end.
        let segments = vec![seg(0.0, 10_000.0, 0.0), seg(10_000.0, 20_000.0, 50_000.0)];
        let err = plan(&segments, 20_000.0).unwrap_err();
        assert!(matches!(err, AudioSyncError::PlanInfeasible { .. }));
    }

    #[test]
    fn test_plan_is_idempotent() {
        let segments = vec![seg(0.0, 10_000.0, 1_000.0), seg(10_000.0, 20_000.0, 1_500.0)];
        let (plan_a, totals_a) = plan(&segments, 30_000.0).unwrap();
        let (plan_b, totals_b) = plan(&segments, 30_000.0).unwrap();
        assert_eq!(plan_a.ops, plan_b.ops);
        assert_eq!(totals_a, totals_b);
    }

    #[test]
    fn test_render_round_trip_preserves_total_duration() {
        let dir = tempdir().unwrap();
        let src_path = dir.path().join("src.wav");
        let out_path = dir.path().join("out.wav");
        let samples = vec![0.2f32; 22_050 * 3];
        write_wav(src_path.to_str().unwrap(), &samples);

        let edit_plan = EditPlan {
            ops: vec![
                EditOp::CopyRange {
                    src_start_ms: 0.0,
                    src_end_ms: 1_000.0,
                },
                EditOp::Silence { duration_ms: 200.0 },
                EditOp::CopyRange {
                    src_start_ms: 1_000.0,
                    src_end_ms: 2_000.0,
                },
            ],
        };

        render(
            &edit_plan,
            &PlanTotals {
                total_silence_ms: 200.0,
                total_trimmed_ms: 0.0,
            },
            src_path.to_str().unwrap(),
            out_path.to_str().unwrap(),
            50.0,
        )
        .unwrap();

        let rendered = pcm_io::load(out_path.to_str().unwrap(), crate::models::LoadRange::default())
            .unwrap();
        let expected_len = ms_to_samples(1_000.0) + ms_to_samples(200.0) + ms_to_samples(1_000.0);
        assert_eq!(rendered.samples.len(), expected_len);
    }

    #[test]
    fn test_render_rejects_existing_output() {
        let dir = tempdir().unwrap();
        let src_path = dir.path().join("src.wav");
        let out_path = dir.path().join("out.wav");
        write_wav(src_path.to_str().unwrap(), &vec![0.0; 22_050]);
        write_wav(out_path.to_str().unwrap(), &vec![0.0; 10]);

        let edit_plan = EditPlan {
            ops: vec![EditOp::CopyRange {
                src_start_ms: 0.0,
                src_end_ms: 500.0,
            }],
        };
        let err = render(
            &edit_plan,
            &PlanTotals::default(),
            src_path.to_str().unwrap(),
            out_path.to_str().unwrap(),
            50.0,
        )
        .unwrap_err();
        assert!(matches!(err, AudioSyncError::IoFailed { .. }));
    }
}
