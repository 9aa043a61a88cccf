//! dubsync CLI — headless audio alignment and drift compensation.
//!
//! Usage:
//!     dubsync align detect main.wav secondary.wav
//!     dubsync align detect-segment main.wav secondary.wav --start-ms 0 --end-ms 30000
//!     dubsync align detect-drift main.wav secondary.wav --json
//!     dubsync audio compensate main.wav secondary.wav --segments-file segments.json -o out.wav

use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Deserialize;

use dubsync_core::align::{align, align_segment};
use dubsync_core::compensate;
use dubsync_core::drift::detect_drift;
use dubsync_core::models::{AudioSegment, DriftScanConfig, ProgressCallback, HOP_SAMPLES};
use dubsync_core::onset;
use dubsync_core::pcm_io;

#[derive(Parser)]
#[command(
    name = "dubsync",
    version,
    about = "dubsync — onset-envelope alignment and drift compensation for secondary audio tracks"
)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alignment detection operations
    Align {
        #[command(subcommand)]
        command: AlignCommands,
    },
    /// Audio editing operations
    Audio {
        #[command(subcommand)]
        command: AudioCommands,
    },
}

#[derive(Subcommand)]
enum AlignCommands {
    /// Detect the alignment offset between two whole tracks
    Detect {
        main: String,
        secondary: String,

        /// Output results as JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Detect the alignment offset within a single time window
    DetectSegment {
        main: String,
        secondary: String,

        #[arg(long)]
        start_ms: f64,

        #[arg(long)]
        end_ms: f64,

        #[arg(long)]
        json: bool,
    },

    /// Scan the full timeline for drift points and derived segments
    DetectDrift {
        main: String,
        secondary: String,

        #[arg(long, default_value_t = dubsync_core::models::DEFAULT_DRIFT_WINDOW_MS)]
        window_ms: f64,

        #[arg(long, default_value_t = dubsync_core::models::DEFAULT_DRIFT_STEP_MS)]
        step_ms: f64,

        #[arg(long, default_value_t = dubsync_core::models::DEFAULT_DRIFT_THRESHOLD_MS)]
        drift_threshold_ms: f64,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AudioCommands {
    /// Build and render a compensation plan for the secondary track
    Compensate {
        secondary: String,

        /// JSON file containing the AudioSegment list from `align detect-drift`
        #[arg(long)]
        segments_file: String,

        #[arg(short, long)]
        output: String,

        #[arg(long, default_value_t = dubsync_core::models::DEFAULT_CROSSFADE_MS)]
        crossfade_ms: f64,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Deserialize)]
struct SegmentsFile {
    segments: Vec<AudioSegment>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    // SAFETY: called before any threads are spawned, at program start.
    unsafe {
        std::env::set_var("RUST_LOG", format!("dubsync={}", level));
    }
    env_logger::init();

    match cli.command {
        Commands::Align { command } => match command {
            AlignCommands::Detect {
                main,
                secondary,
                json,
            } => cmd_align_detect(main, secondary, json),
            AlignCommands::DetectSegment {
                main,
                secondary,
                start_ms,
                end_ms,
                json,
            } => cmd_align_detect_segment(main, secondary, start_ms, end_ms, json),
            AlignCommands::DetectDrift {
                main,
                secondary,
                window_ms,
                step_ms,
                drift_threshold_ms,
                json,
            } => cmd_align_detect_drift(
                main,
                secondary,
                window_ms,
                step_ms,
                drift_threshold_ms,
                json,
            ),
        },
        Commands::Audio { command } => match command {
            AudioCommands::Compensate {
                secondary,
                segments_file,
                output,
                crossfade_ms,
                json,
            } => cmd_audio_compensate(secondary, segments_file, output, crossfade_ms, json),
        },
    }
}

// ---------------------------------------------------------------------------
//  Commands
// ---------------------------------------------------------------------------

fn cmd_align_detect(main: String, secondary: String, json: bool) -> anyhow::Result<()> {
    let t0 = Instant::now();

    let main_pcm = pcm_io::load(&main, Default::default())?;
    let secondary_pcm = pcm_io::load(&secondary, Default::default())?;

    let env_main = onset::envelope(&main_pcm, HOP_SAMPLES);
    let env_secondary = onset::envelope(&secondary_pcm, HOP_SAMPLES);

    let result = align(&env_main, &env_secondary);
    let elapsed = t0.elapsed().as_secs_f64();

    if json {
        let output = serde_json::json!({
            "offset_ms": result.offset_ms,
            "confidence": result.confidence,
            "elapsed_s": elapsed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!("offset: {:+.1} ms, confidence: {:.3}", result.offset_ms, result.confidence);
    }

    Ok(())
}

fn cmd_align_detect_segment(
    main: String,
    secondary: String,
    start_ms: f64,
    end_ms: f64,
    json: bool,
) -> anyhow::Result<()> {
    let result = align_segment(&main, &secondary, start_ms, end_ms)?;

    if json {
        let output = serde_json::json!({
            "offset_ms": result.offset_ms,
            "confidence": result.confidence,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        eprintln!("offset: {:+.1} ms, confidence: {:.3}", result.offset_ms, result.confidence);
    }

    Ok(())
}

fn cmd_align_detect_drift(
    main: String,
    secondary: String,
    window_ms: f64,
    step_ms: f64,
    drift_threshold_ms: f64,
    json: bool,
) -> anyhow::Result<()> {
    let config = DriftScanConfig {
        window_ms,
        step_ms,
        drift_threshold_ms,
        max_workers: None,
    };

    let progress: Option<ProgressCallback> = if !json {
        Some(Box::new(|step, total, msg| {
            eprintln!("[{}/{}] {}", step, total, msg);
        }))
    } else {
        None
    };

    let report = detect_drift(&main, &secondary, config, progress.as_ref(), None)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "\nscanned in {:.2}s — {} drift point(s), {} segment(s)",
            report.scan_duration_seconds,
            report.drift_points.len(),
            report.segments.len()
        );
        for d in &report.drift_points {
            eprintln!(
                "  drift @ {:.0}ms: {:+.1}ms -> {:+.1}ms (conf={:.2})",
                d.timestamp_ms, d.offset_before_ms, d.offset_after_ms, d.confidence
            );
        }
        for s in &report.segments {
            eprintln!(
                "  segment [{:.0}ms, {:.0}ms): offset={:+.1}ms conf={:.2}",
                s.start_time_ms, s.end_time_ms, s.offset_ms, s.confidence
            );
        }
    }

    Ok(())
}

fn cmd_audio_compensate(
    secondary: String,
    segments_file: String,
    output: String,
    crossfade_ms: f64,
    json: bool,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&segments_file)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", segments_file, e))?;
    let parsed: SegmentsFile = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("cannot parse {}: {}", segments_file, e))?;

    let secondary_duration_ms = pcm_io::probe_duration_ms(&secondary)?;
    let (edit_plan, totals) = compensate::plan(&parsed.segments, secondary_duration_ms)?;

    if !json {
        eprintln!(
            "plan: {} op(s), {:.1}ms silence, {:.1}ms trimmed",
            edit_plan.ops.len(),
            totals.total_silence_ms,
            totals.total_trimmed_ms
        );
    }

    let report = compensate::render(&edit_plan, &totals, &secondary, &output, crossfade_ms)?;

    if json {
        let out = serde_json::json!({
            "compensated_path": output,
            "total_silence_inserted_ms": report.total_silence_ms,
            "total_trimmed_ms": report.total_trimmed_ms,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        eprintln!("wrote {}", output);
    }

    Ok(())
}
