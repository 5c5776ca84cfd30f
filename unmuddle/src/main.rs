//! unmuddle - pen dump organizer
//!
//! Converts file formats and organizes the output of a pen dump tool:
//! pages become per-notebook PDFs, recordings are placed next to the page
//! they were made on (or under `other_recordings/`).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use unmuddle::services::{ExternalTools, ToolRequirements};
use unmuddle::workflow::{Pipeline, PipelineOptions};
use unmuddle_common::config::{
    resolve_optional, resolve_setting, TomlConfig, DEFAULT_LOG_LEVEL, DEFAULT_THUMBNAIL_SIZE,
};

/// Background directory used when nothing else names one
const DEFAULT_BACKGROUNDS_DIR: &str = "backgrounds";

/// Command-line arguments for unmuddle
#[derive(Parser, Debug)]
#[command(name = "unmuddle")]
#[command(about = "Convert file formats and organize output from a pen dump.")]
#[command(version)]
struct Args {
    /// Don't convert aac audio files to ogg vorbis (conversion requires ffmpeg or avconv)
    #[arg(long = "aac")]
    keep_aac: bool,

    /// Additionally create one pdf per notebook with all notebook pages (requires pdftk)
    #[arg(long)]
    notebook: bool,

    /// Generate png thumbnails of pdfs (requires ImageMagick or GraphicsMagick)
    #[arg(long = "thumb")]
    thumbnails: bool,

    /// Thumbnail maximum dimension
    #[arg(long = "thumbsize")]
    thumbnail_size: Option<u32>,

    /// Directory holding left.png and right.png page backgrounds
    #[arg(long)]
    backgrounds: Option<PathBuf>,

    /// Config file (default: ~/.config/unmuddle/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    /// The directory generated by the dump tool
    input_dir: PathBuf,

    /// Where to write the output
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load config file")?;

    init_tracing(&args, &config);

    let options = PipelineOptions {
        keep_aac: args.keep_aac,
        combine_notebooks: args.notebook,
        thumbnails: args.thumbnails,
        thumbnail_size: resolve_setting(
            args.thumbnail_size,
            "UNMUDDLE_THUMBNAIL_SIZE",
            config.thumbnail_size,
            DEFAULT_THUMBNAIL_SIZE,
        ),
    };

    let backgrounds_dir = resolve_optional(
        args.backgrounds.clone(),
        "UNMUDDLE_BACKGROUNDS",
        config.backgrounds_dir.clone(),
    )
    .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKGROUNDS_DIR));

    info!("Starting unmuddle {}", env!("CARGO_PKG_VERSION"));
    info!("Input: {}", args.input_dir.display());
    info!("Output: {}", args.output_dir.display());

    // All tool checks happen before any pipeline work
    let requirements = ToolRequirements {
        transcode: !options.keep_aac,
        thumbnails: options.thumbnails,
        merge: options.combine_notebooks,
    };
    let tools = ExternalTools::detect(requirements, &config.tools, backgrounds_dir)?;

    let report = Pipeline::new(options, &tools)
        .run(&args.input_dir, &args.output_dir)
        .with_context(|| format!("Failed to process {}", args.input_dir.display()))?;

    println!(
        "{} pages, {} recordings ({} without a page), {} notebook pdfs.",
        report.pages.len(),
        report.recordings.len(),
        report.orphaned_recordings(),
        report.notebooks.len()
    );
    if report.tool_failures() > 0 {
        println!(
            "{} external tool calls failed; see the log for details.",
            report.tool_failures()
        );
    }
    println!("Unmuddle completed successfully.");

    Ok(())
}

/// Initialize tracing: `RUST_LOG`, then `--verbose`, then config, then default
fn init_tracing(args: &Args, config: &TomlConfig) {
    let fallback = if args.verbose {
        "unmuddle=debug,unmuddle_common=debug".to_string()
    } else {
        match config.log_level.as_deref() {
            // Full directive, e.g. "unmuddle=trace,walkdir=warn"
            Some(directive) if directive.contains('=') => directive.to_string(),
            level => {
                let level = level.unwrap_or(DEFAULT_LOG_LEVEL);
                format!("unmuddle={level},unmuddle_common={level}")
            }
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
