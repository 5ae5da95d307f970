use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use cutout::{
    ColorKeyMatte, ColorKeyOpts, FfmpegSource, Fps, FrameTransform, GifEncoder, IdentityMatte,
    Job, JobConfig, KeyColor, Scale,
};

#[derive(Parser, Debug)]
#[command(name = "cutout", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the background from a video and write an animated GIF (requires `ffmpeg`).
    Render(RenderArgs),
    /// Print source dimensions and the decoded output size.
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct ScaleArgs {
    /// Output width in pixels; height keeps the aspect ratio.
    #[arg(long, conflicts_with = "original_size")]
    width: Option<u32>,

    /// Keep the source resolution.
    #[arg(long)]
    original_size: bool,
}

impl ScaleArgs {
    fn resolve(&self, base: Scale) -> Scale {
        if self.original_size {
            Scale::Original
        } else if let Some(w) = self.width {
            Scale::Width(w)
        } else {
            base
        }
    }
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output GIF path, or a directory to write `<dir>/<job-id>/output.gif` into.
    #[arg(long)]
    out: PathBuf,

    /// Job config JSON; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames sampled per second of video (`N` or `N/D`).
    #[arg(long, value_parser = parse_fps)]
    fps: Option<Fps>,

    #[command(flatten)]
    scale: ScaleArgs,

    /// Transform worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Frames buffered between the decoder and the workers.
    #[arg(long)]
    capacity: Option<usize>,

    /// Fail the job after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Display time of each GIF frame.
    #[arg(long)]
    delay_ms: Option<u32>,

    /// `0` loops forever.
    #[arg(long)]
    loops: Option<u16>,

    /// Background colour: `auto` or `RRGGBB`.
    #[arg(long, default_value = "auto")]
    key: KeyColor,

    /// Colour distance treated as background.
    #[arg(long, default_value_t = 40.0)]
    tolerance: f32,

    /// Width of the soft edge above the tolerance.
    #[arg(long, default_value_t = 20.0)]
    softness: f32,

    /// Skip background removal.
    #[arg(long)]
    no_matte: bool,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[command(flatten)]
    scale: ScaleArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Probe(args) => cmd_probe(args),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_fps(s: &str) -> Result<Fps, String> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim(), d.trim()),
        None => (s.trim(), "1"),
    };
    let num = num
        .parse::<u32>()
        .map_err(|e| format!("invalid fps numerator '{num}': {e}"))?;
    let den = den
        .parse::<u32>()
        .map_err(|e| format!("invalid fps denominator '{den}': {e}"))?;
    Fps::new(num, den).map_err(|e| e.to_string())
}

fn build_config(args: &RenderArgs) -> anyhow::Result<JobConfig> {
    let mut cfg = match &args.config {
        Some(path) => JobConfig::from_path(path)?,
        None => JobConfig::default(),
    };
    if let Some(fps) = args.fps {
        cfg.sample_rate = fps;
    }
    cfg.scale = args.scale.resolve(cfg.scale);
    if let Some(w) = args.workers {
        cfg.pool_size = Some(w);
    }
    if let Some(c) = args.capacity {
        cfg.channel_capacity = c;
    }
    if let Some(secs) = args.timeout_secs {
        cfg.deadline_ms = Some(secs.saturating_mul(1000));
    }
    if let Some(d) = args.delay_ms {
        cfg.timing.frame_delay_ms = d;
    }
    if let Some(l) = args.loops {
        cfg.timing.loop_count = l;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn output_path(out: &Path, job_id: &uuid::Uuid) -> PathBuf {
    if out.is_dir() {
        out.join(job_id.to_string()).join("output.gif")
    } else {
        out.to_path_buf()
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = build_config(&args)?;

    let transform: Arc<dyn FrameTransform> = if args.no_matte {
        Arc::new(IdentityMatte)
    } else {
        Arc::new(ColorKeyMatte::new(ColorKeyOpts {
            key: args.key,
            tolerance: args.tolerance,
            softness: args.softness,
        })?)
    };

    let info = cutout::probe_video(&args.in_path)
        .with_context(|| format!("open video '{}'", args.in_path.display()))?;
    let size = cfg.scale.resolve(info.size);
    let expected = info.estimated_frames(cfg.sample_rate);

    let job = Job::new(FfmpegSource::new(&args.in_path), cfg)?;
    let out_path = output_path(&args.out, &job.id());
    tracing::info!(
        id = %job.id(),
        input = %args.in_path.display(),
        %size,
        expected_frames = expected,
        "rendering"
    );

    let mut encoder = GifEncoder::new();
    let out = job.run(transform, &mut encoder)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    std::fs::write(&out_path, &out.bytes)
        .with_context(|| format!("write output '{}'", out_path.display()))?;

    println!("job {}", out.id);
    println!("wrote {} ({} bytes)", out_path.display(), out.bytes.len());
    println!(
        "frames={} workers={} peak_ingress={} peak_reorder={} elapsed={:.2}s",
        out.stats.frames_encoded,
        out.stats.workers,
        out.stats.peak_ingress_depth,
        out.stats.peak_reorder_depth,
        out.stats.elapsed.as_secs_f64()
    );
    Ok(())
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let info = cutout::probe_video(&args.in_path)?;
    let scaled = args.scale.resolve(Scale::default()).resolve(info.size);
    println!("source: {}", info.path.display());
    println!("size: {}", info.size);
    match info.fps {
        Some(fps) => println!("fps: {fps}"),
        None => println!("fps: unknown"),
    }
    println!("duration: {:.3}s", info.duration_secs);
    println!("output size: {scaled}");
    Ok(())
}
