use anyhow::{Context, Result};
use chunk_recorder::{
    config::Config,
    graph::pipeline::GstGraph,
    gst_utils,
    recording::{
        SegmentRecord, SegmentState, Session, SessionConfig, SessionOutcome, SessionReport,
    },
    signals,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CHUNK_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    /// Output location prefix, files are named {prefix}-NNN.mp4
    #[arg(short, long)]
    prefix: Option<String>,

    /// Seconds recorded per segment
    #[arg(long)]
    record_duration: Option<u64>,

    /// Seconds skipped between segments
    #[arg(long)]
    gap_duration: Option<u64>,

    /// Seconds to wait before the first segment
    #[arg(long)]
    priming: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Check available GStreamer plugins and exit
    #[arg(long)]
    check_plugins: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ref prefix) = self.prefix {
            config.recording.location_prefix = prefix.clone();
        }
        if let Some(seconds) = self.record_duration {
            config.recording.record_duration_seconds = seconds;
        }
        if let Some(seconds) = self.gap_duration {
            config.recording.gap_duration_seconds = seconds;
        }
        if let Some(seconds) = self.priming {
            config.recording.priming_seconds = seconds;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.app.log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    let gst_capabilities = gst_utils::initialize()?;
    info!("GStreamer initialized successfully");

    if args.check_plugins {
        gst_utils::print_plugin_info(&gst_capabilities);
        return Ok(ExitCode::SUCCESS);
    }

    let graph = GstGraph::build(&config.pipeline, &config.queue)
        .context("Failed to build recording pipeline")?;

    let session = Session::new(Arc::new(graph), SessionConfig::from(&config.recording));
    let listener = signals::spawn_shutdown_listener(session.handle());

    let report = session.run().await?;
    listener.abort();

    log_summary(&report);

    Ok(match report.outcome {
        SessionOutcome::Completed => ExitCode::SUCCESS,
        SessionOutcome::Failed(_) => ExitCode::FAILURE,
    })
}

fn log_summary(report: &SessionReport) {
    let closed = report
        .segments
        .iter()
        .filter(|s| s.state == SegmentState::Closed)
        .count();
    info!("Recorded {} complete segments", closed);

    for segment in &report.segments {
        match segment.state {
            SegmentState::Closed => info!(
                "  {} started {} and recorded for {:?}, first pts {:?}, {} buffers dropped before keyframe",
                segment.location.display(),
                started_at(segment),
                segment.recorded_for().unwrap_or_default(),
                segment.first_pts,
                segment.dropped_before_keyframe
            ),
            SegmentState::Pending => {}
            state => warn!(
                "  {} started {} and left {:?}",
                segment.location.display(),
                started_at(segment),
                state
            ),
        }
    }

    if let SessionOutcome::Failed(ref reason) = report.outcome {
        error!("Recording stopped: {}", reason);
    }
}

fn started_at(segment: &SegmentRecord) -> String {
    segment
        .started
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
