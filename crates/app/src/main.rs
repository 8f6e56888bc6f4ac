mod config;
mod monitor;

use std::sync::Arc;

use anyhow::Result;
use face_detect::{FaceDetector, HaarDetector};
use tracing::{info, warn};
use video_ingest::{CameraSource, FrameSource};

use crate::{
    config::MonitorConfig,
    monitor::{
        server::{AccessPolicy, AllowAll, BearerTokenPolicy},
        telemetry, PipelineController, SourceFactory,
    },
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = MonitorConfig::from_args(&args)?;

    telemetry::init_tracing();
    let _ = telemetry::init_metrics_recorder();

    let detector: Arc<dyn FaceDetector> =
        Arc::new(HaarDetector::load(&config.cascade_path, config.detector)?);

    let source_uri = config.source_uri.clone();
    let target_size = (config.width, config.height);
    let source_factory: Arc<SourceFactory> = Arc::new(move || {
        CameraSource::open(&source_uri, target_size)
            .map(|source| Box::new(source) as Box<dyn FrameSource>)
    });

    let controller = Arc::new(PipelineController::new(
        detector,
        source_factory,
        config.alarm_threshold,
        config.jpeg_quality,
    ));

    let policy: Arc<dyn AccessPolicy> = match &config.auth_token {
        Some(token) => Arc::new(BearerTokenPolicy::new(token.clone())),
        None => {
            warn!("no --auth-token configured; all callers are treated as authorized");
            Arc::new(AllowAll)
        }
    };

    info!(
        "occupancy monitor listening on http://{} (source: {})",
        config.bind_addr, config.source_uri
    );
    monitor::server::serve(&config.bind_addr, controller, policy)
}
