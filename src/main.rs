use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use assettag::{DetectOptions, Detector, DetectorConfig, OcrsRecognizer, Recognizer};

#[derive(Parser)]
#[command(name = "assettag")]
#[command(about = "Read asset-tag serial codes from label photos")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Cheaper mode: fewer image variants per line
    #[arg(long)]
    turbo: bool,

    /// Line groups recognized concurrently
    #[arg(long, value_name = "N", default_value_t = 4)]
    batch_size: usize,

    /// Stop after this many text lines
    #[arg(long, value_name = "N")]
    max_lines: Option<usize>,

    /// TOML file overriding detector constants
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "assettag=debug" } else { "assettag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = match &args.config {
        Some(path) => DetectorConfig::from_toml_file(path)?,
        None => DetectorConfig::default(),
    };

    let recognizer: Arc<dyn Recognizer> = match args.models {
        Some(dir) => Arc::new(OcrsRecognizer::with_model_dir(dir)),
        None => Arc::new(OcrsRecognizer::new()?),
    };
    let detector = Detector::new(recognizer, config)?;
    detector.warm_up().await;

    let bytes = std::fs::read(&args.image_path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.image_path.display(), e))?;

    let mut options = DetectOptions::new()
        .with_batch_size(args.batch_size)
        .with_turbo(args.turbo);
    if let Some(max_lines) = args.max_lines {
        options = options.with_max_lines(max_lines);
    }
    if let Some(dir) = args.debug_out {
        options = options.with_debug_dir(dir);
    }
    options = options.with_progress(|event| {
        debug!(
            phase = %event.phase,
            current = event.current,
            total = event.total,
            detail = event.detail.as_deref().unwrap_or(""),
            "progress"
        );
    });

    let result = detector.detect(bytes, &options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.codes.is_empty() {
        println!("No asset codes detected.");
    }
    for (sequence, code) in result.codes.iter().zip(result.asset_codes()) {
        println!("{}  ({})", code, sequence);
    }
    let s = &result.stats;
    eprintln!(
        "lines: {} kept: {} dropped: {:?} variants/line: {} avg confidence: {} time: {}ms",
        s.total_lines,
        s.kept_lines,
        s.dropped_indices,
        s.variants_tried_per_line,
        s.avg_confidence.map(|c| format!("{:.1}", c)).unwrap_or_else(|| "-".to_string()),
        s.duration_ms
    );

    Ok(())
}
