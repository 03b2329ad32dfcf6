use clap::Parser;
use pupil_signal::config::parse_key_value;
use pupil_signal::{EyeFrame, EyePipeline, PipelineConfig, PipelineMode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use vng_harness::{read_frames, replay, NystagmusConfig, NystagmusGenerator};

/// Command line arguments for the pipeline replay tool
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replay pupil detections through the signal pipeline",
    long_about = "Runs one eye's pupil detections through gap interpolation, smoothing, \
        precision tracking and blink detection, writing one JSON result per frame.\n\n\
        Frames come either from a JSONL recording (--input) or from a seeded synthetic \
        nystagmus generator. Useful for:\n  \
        - Comparing smoothing kernels and window sizes on the same recording\n  \
        - Tuning outlier and fixation thresholds\n  \
        - Checking blink detection against known blink schedules\n\n\
        A summary is printed to stderr when the run completes."
)]
struct Args {
    #[arg(
        short,
        long,
        help = "JSONL file of recorded eye frames",
        long_help = "Read frames from a JSON-lines file, one frame per line in the form \
            {\"timestamp\": 1.25, \"detection\": {\"x\": 320.5, \"y\": 241.0, \"radius\": 24.0}}. \
            Use \"detection\": null for frames where the pupil was not found. When omitted, \
            a synthetic recording is generated instead."
    )]
    input: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        default_value_t = 10.0,
        help = "Synthetic recording length in seconds"
    )]
    duration: f64,

    #[arg(long, default_value_t = 60.0, help = "Synthetic frame rate in Hz")]
    frame_rate: f64,

    #[arg(
        short,
        long,
        default_value_t = 20.0,
        help = "Peak-to-peak nystagmus amplitude in pixels",
        long_help = "Horizontal excursion of each synthetic nystagmus beat in pixels, from the \
            start of the slow phase to the point where the fast phase resets it."
    )]
    amplitude: f64,

    #[arg(long, default_value_t = 2.0, help = "Nystagmus beats per second")]
    beat_hz: f64,

    #[arg(long, default_value_t = 0.5, help = "Synthetic detector noise in pixels (std dev)")]
    noise: f64,

    #[arg(long, default_value_t = 42, help = "Seed for the synthetic generator")]
    seed: u64,

    #[arg(
        short,
        long,
        help = "Pipeline configuration JSON file",
        long_help = "Load the pipeline configuration from a JSON file as written by \
            PipelineConfig::save_to_file. Missing fields keep their defaults. --set and \
            --mode are applied on top of this file."
    )]
    config: Option<PathBuf>,

    #[arg(
        long = "set",
        value_parser = parse_key_value,
        help = "Override a setting (key=value, repeatable)",
        long_help = "Override one pipeline setting. May be given multiple times. Recognized keys:\n  \
            window_size, filter_type, max_interpolation_gap,\n  \
            outlier_threshold, fixation_threshold, fixation_distance, fixation_alpha,\n  \
            max_lost_frames, history_size,\n  \
            min_blink_duration, max_blink_duration, mode\n\n\
            Unknown keys are ignored with a warning."
    )]
    settings: Vec<(String, String)>,

    #[arg(short, long, help = "Position path: filtered or tracked")]
    mode: Option<PipelineMode>,

    #[arg(
        short,
        long,
        help = "Output JSONL file (stdout if omitted)"
    )]
    output: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)?,
        None => PipelineConfig::default(),
    };

    for (key, value) in &args.settings {
        if !config.apply_setting(key, value)? {
            log::warn!("Unknown setting '{key}' ignored");
        }
    }

    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    Ok(config)
}

fn load_frames(args: &Args) -> Result<Vec<EyeFrame>, Box<dyn std::error::Error>> {
    if let Some(path) = &args.input {
        let frames = read_frames(BufReader::new(File::open(path)?))?;
        log::info!("Loaded {} frames from {}", frames.len(), path.display());
        return Ok(frames);
    }

    let synthetic = NystagmusConfig {
        frame_rate: args.frame_rate,
        duration: args.duration,
        amplitude: args.amplitude,
        beat_hz: args.beat_hz,
        noise_std: args.noise,
        ..Default::default()
    };
    log::info!(
        "Generating {} synthetic frames (seed {})",
        synthetic.frame_count(),
        args.seed
    );
    Ok(NystagmusGenerator::new(synthetic, args.seed)?.collect())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(&args)?;
    let frames = load_frames(&args)?;
    let mut pipeline = EyePipeline::new(&config);

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = replay(&mut pipeline, frames, writer)?;

    eprintln!("Pipeline Replay Summary");
    eprintln!("=======================");
    eprintln!("Mode: {}", config.mode);
    eprintln!(
        "Filter: {} (window {})",
        config.filter.filter_kind, config.filter.window_size
    );
    eprintln!("Frames: {}", summary.frames);
    eprintln!("Detected frames: {}", summary.detected_frames);
    eprintln!("Blinks: {}", summary.blinks);
    eprintln!("Stable fraction: {:.1}%", summary.stable_fraction() * 100.0);
    eprintln!("Frames without position: {}", summary.unpositioned_frames);

    Ok(())
}
