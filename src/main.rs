use anyhow::{anyhow, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::Parser;
use notereel::{
    discover_documents, load_style, run_queue, FfmpegEncoder, RenderOptions,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Render Markdown notes into vertical videos with ffmpeg.")]
struct Args {
    /// Slot label used for discovery and output naming
    #[arg(long, default_value = "morning")]
    slot: String,

    /// Three-letter weekday code (mon..sun), or "auto" to use today
    #[arg(long, default_value = "auto")]
    weekday: String,

    /// Render a single note instead of discovering candidates
    #[arg(long)]
    file: Option<PathBuf>,

    /// Maximum number of successful renders for this run
    #[arg(long)]
    max: Option<usize>,

    /// Fallback duration in seconds for notes without one
    #[arg(long)]
    dur: Option<f64>,

    /// IANA timezone used for dates and weekday resolution
    #[arg(long, default_value = "Asia/Seoul")]
    tz: String,

    /// Directory scanned for notes
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Background image/video directory
    #[arg(long = "bg-dir", default_value = "assets/bg")]
    bg_dir: PathBuf,

    /// Background music directory
    #[arg(long = "bgm-dir", default_value = "assets/bgm")]
    bgm_dir: PathBuf,

    /// Font file override
    #[arg(long)]
    font: Option<PathBuf>,

    /// Style configuration file (JSON)
    #[arg(long)]
    style: Option<PathBuf>,

    /// Output root directory
    #[arg(long = "out-dir", default_value = "videos/queue")]
    out_dir: PathBuf,

    /// ffmpeg executable to invoke
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let timezone: Tz = args
        .tz
        .parse()
        .map_err(|_| anyhow!("unknown timezone '{}'", args.tz))?;
    let now = Utc::now().with_timezone(&timezone);

    let weekday = match args.weekday.as_str() {
        "" | "auto" => now.format("%a").to_string().to_lowercase(),
        explicit => explicit.to_lowercase(),
    };

    let mut style = load_style(args.style.as_deref());
    if args.font.is_some() {
        style.font = args.font.clone();
    }

    let options = RenderOptions {
        slot: args.slot.clone(),
        duration_override: args.dur,
        background_dir: args.bg_dir,
        music_dir: args.bgm_dir,
        out_root: args.out_dir,
        timezone,
        style,
    };

    let candidates = match args.file {
        Some(file) => vec![file],
        None => discover_documents(&args.data_dir, &args.slot, &weekday),
    };
    if candidates.is_empty() {
        info!(
            slot = %args.slot,
            %weekday,
            "no candidate notes found, nothing to render"
        );
        return Ok(());
    }
    info!(
        count = candidates.len(),
        slot = %args.slot,
        %weekday,
        "starting render queue"
    );

    let encoder = FfmpegEncoder::new(args.ffmpeg);
    let mut rng = rand::thread_rng();
    let max = args.max.unwrap_or(usize::MAX);
    let summary = run_queue(&candidates, &options, max, &mut rng, &encoder);

    info!(
        rendered = summary.rendered,
        skipped = summary.skipped,
        failed = summary.failed,
        "run complete"
    );
    Ok(())
}
