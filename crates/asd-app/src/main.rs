mod synthetic;

use anyhow::Context;
use asd_assign::KuhnMunkresRlapSolver;
use asd_buffer::{AsdBufferPool, AsdModel, ModelPool};
use asd_engine::{AsdEngine, Frame};
use asd_foundation::{AsdConfig, ShutdownHandle};
use asd_geometry::Orientation;
use asd_telemetry::PipelineMetrics;
use asd_tracker::Tracker;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use synthetic::{SyntheticAsdModel, SyntheticFaceDetector, SyntheticFaceEmbedder};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Demo CLI that runs the active-speaker-detection core against a
/// synthetically generated face, printing score updates as they arrive.
#[derive(Parser, Debug)]
#[command(name = "asd-app", about = "Active speaker detection pipeline demo")]
struct Args {
    /// Optional TOML config file; falls back to built-in defaults.
    #[arg(long, env = "ASD_CONFIG")]
    config: Option<PathBuf>,

    /// Number of synthetic frames to run before exiting; unbounded if omitted.
    #[arg(long)]
    frames: Option<u64>,

    /// Source frame width in pixels.
    #[arg(long, default_value_t = 640)]
    width: usize,

    /// Source frame height in pixels.
    #[arg(long, default_value_t = 480)]
    height: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn solid_frame(width: usize, height: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(width * height * 4);
    for _ in 0..(width * height) {
        buf.extend_from_slice(&[255, 180, 180, 180]);
    }
    buf
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AsdConfig::load_from(path).context("loading ASD config")?,
        None => AsdConfig::default(),
    };

    info!(framerate = config.framerate, video_length = config.video_length, "starting asd-app demo pipeline");

    let tracker = Tracker::new(
        config.tracker,
        Arc::new(SyntheticFaceDetector::new()),
        Arc::new(SyntheticFaceEmbedder),
        Arc::new(KuhnMunkresRlapSolver),
    );

    let models: Vec<Arc<dyn AsdModel>> = (0..config.pool.num_asd_models)
        .map(|_| Arc::new(SyntheticAsdModel) as Arc<dyn AsdModel>)
        .collect();
    let model_pool = Arc::new(ModelPool::new(models));

    let pool = Arc::new(AsdBufferPool::new(
        &config.pool,
        config.video_length,
        config.crop.frame_width,
        config.crop.frame_height,
        config.min_frames as u32,
        config.min_segment_gap,
        config.framerate,
        model_pool,
        PipelineMetrics::default(),
    )?);

    let mut engine = AsdEngine::new(config, tracker, pool, PipelineMetrics::default());
    engine.set_callback(|speakers| {
        for speaker in speakers {
            info!(
                speaker = %speaker.id,
                speaking = speaker.is_speaking,
                probability = speaker.probability,
                misses = speaker.misses,
                "speaker update"
            );
        }
    });

    let mut shutdown = ShutdownHandle::new();
    let ctrlc_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc_shutdown.request_shutdown();
        }
    });

    let frame_bytes = solid_frame(args.width, args.height);
    let frame_period = Duration::from_secs_f64(1.0 / f64::from(config.framerate));
    let mut ticker = tokio::time::interval(frame_period);
    let mut frame_index: u64 = 0;
    let mut timestamp = 0.0f64;

    loop {
        if shutdown.is_shutting_down() {
            break;
        }
        if let Some(limit) = args.frames {
            if frame_index >= limit {
                break;
            }
        }

        ticker.tick().await;

        let frame = Frame {
            pixel_buffer: &frame_bytes,
            source_width: args.width,
            source_height: args.height,
            timestamp,
            orientation: Orientation::Deg0,
            mirrored: false,
            drop_frame: false,
        };
        engine.update(frame).await.context("engine update failed")?;

        frame_index += 1;
        timestamp += frame_period.as_secs_f64();
    }

    info!(frames_processed = frame_index, "asd-app demo pipeline exiting");
    Ok(())
}
