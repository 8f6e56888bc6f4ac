//! Producer loop and lifecycle for the capture → detect → annotate →
//! encode → stream pipeline.
//!
//! One long-lived producer thread drives the loop and suspends at exactly
//! two points: waiting for the next frame from the device and waiting for
//! the transport channel to accept the next chunk. The bounded(1) channel
//! is the backpressure seam; the loop never buffers or drops frames on its
//! own. Consuming the returned [`FrameStream`] pulls the loop forward one
//! frame per chunk, and dropping it releases the device.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use face_detect::{BoundingBox, FaceDetector};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use video_ingest::{CaptureError, Frame, FrameSource};

use crate::monitor::{
    annotation::annotate,
    encoding::{encode_jpeg, multipart_chunk, EncodeError},
    state::{Occupancy, OccupancyState, PipelineRunState, RunState},
};

const EMIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Opens a fresh capture device for each pipeline start.
pub(crate) type SourceFactory =
    dyn Fn() -> Result<Box<dyn FrameSource>, CaptureError> + Send + Sync;

#[derive(Debug, Error)]
pub(crate) enum StartError {
    #[error("pipeline already running")]
    AlreadyRunning,
    #[error("pipeline is stopping; retry shortly")]
    Stopping,
    #[error(transparent)]
    Device(#[from] CaptureError),
    #[error("failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Lazy, non-restartable sequence of multipart chunks produced by one
/// pipeline run. Ends when the stream is stopped or the capture fails.
pub(crate) struct FrameStream {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl FrameStream {
    pub(crate) async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Owns the run-state machine, the occupancy state, and the producer
/// thread. The capture device handle lives entirely inside the producer.
pub(crate) struct PipelineController {
    occupancy: Arc<OccupancyState>,
    run_state: Arc<PipelineRunState>,
    detector: Arc<dyn FaceDetector>,
    source_factory: Arc<SourceFactory>,
    jpeg_quality: u8,
    producer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PipelineController {
    pub(crate) fn new(
        detector: Arc<dyn FaceDetector>,
        source_factory: Arc<SourceFactory>,
        alarm_threshold: usize,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            occupancy: Arc::new(OccupancyState::new(alarm_threshold)),
            run_state: Arc::new(PipelineRunState::new()),
            detector,
            source_factory,
            jpeg_quality,
            producer: Mutex::new(None),
        }
    }

    pub(crate) fn occupancy(&self) -> Occupancy {
        self.occupancy.snapshot()
    }

    pub(crate) fn run_state(&self) -> RunState {
        self.run_state.current()
    }

    /// Claim the pipeline, open the device, and spawn the producer loop.
    ///
    /// Exactly one caller can hold a [`FrameStream`] at a time; while one
    /// is live a second start reports [`StartError::AlreadyRunning`]
    /// instead of opening another device handle.
    pub(crate) fn start(&self) -> Result<FrameStream, StartError> {
        self.run_state.try_begin().map_err(|state| match state {
            RunState::Running => StartError::AlreadyRunning,
            _ => StartError::Stopping,
        })?;
        self.reap_producer();

        let source = match (self.source_factory)() {
            Ok(source) => source,
            Err(err) => {
                self.run_state.settle_idle();
                return Err(StartError::Device(err));
            }
        };

        let (tx, rx) = mpsc::channel(1);
        let worker = ProducerLoop {
            occupancy: self.occupancy.clone(),
            run_state: self.run_state.clone(),
            detector: self.detector.clone(),
            jpeg_quality: self.jpeg_quality,
        };
        let handle = match super::telemetry::spawn_thread("monitor-pipeline", move || {
            worker.run(source, tx)
        }) {
            Ok(handle) => handle,
            Err(err) => {
                // The closure (and the source inside it) is dropped; the
                // device closes through its Drop impl.
                self.run_state.settle_idle();
                return Err(StartError::Spawn(err));
            }
        };
        if let Ok(mut guard) = self.producer.lock() {
            *guard = Some(handle);
        }

        Ok(FrameStream { rx })
    }

    /// Halt the loop and wait for the device to be released.
    ///
    /// The producer observes the state change within one iteration, emits
    /// no further chunk, closes the source, and resets the occupancy to
    /// `{0, false}` before settling Idle. No-op when already Idle.
    pub(crate) fn stop(&self) {
        self.run_state.request_stop();
        self.reap_producer();
    }

    fn reap_producer(&self) {
        let handle = match self.producer.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("pipeline producer thread panicked");
            }
        }
    }
}

struct ProducerLoop {
    occupancy: Arc<OccupancyState>,
    run_state: Arc<PipelineRunState>,
    detector: Arc<dyn FaceDetector>,
    jpeg_quality: u8,
}

impl ProducerLoop {
    fn run(self, mut source: Box<dyn FrameSource>, tx: mpsc::Sender<Vec<u8>>) {
        let mut frames: u64 = 0;
        while self.run_state.is_running() {
            let frame = match source.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    // A broken device is terminal for this stream; a fresh
                    // start may reopen it.
                    error!("capture error, ending stream: {err}");
                    metrics::counter!("monitor_capture_errors_total").increment(1);
                    break;
                }
            };

            let detections = self.detector.detect(&frame);
            if !self.run_state.is_running() {
                break;
            }
            let occupancy = self.occupancy.update(detections.len());
            metrics::gauge!("monitor_people_count").set(occupancy.count as f64);

            let chunk = match process_frame(&frame, &detections, occupancy, self.jpeg_quality) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("skipping frame that failed to serialize: {err}");
                    metrics::counter!("monitor_encode_errors_total").increment(1);
                    continue;
                }
            };

            if !emit(&tx, &self.run_state, chunk) {
                break;
            }
            frames = frames.wrapping_add(1);
            metrics::counter!("monitor_frames_total").increment(1);
        }

        source.close();
        self.occupancy.reset();
        self.run_state.settle_idle();
        debug!("pipeline settled idle after {frames} frames");
    }
}

/// Annotate, serialize, and frame a single captured frame.
fn process_frame(
    frame: &Frame,
    detections: &[BoundingBox],
    occupancy: Occupancy,
    jpeg_quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let image = annotate(frame, detections, occupancy)?;
    let jpeg = encode_jpeg(image, jpeg_quality)?;
    Ok(multipart_chunk(&jpeg))
}

/// Hand a chunk to the transport, waiting while the consumer is slow.
///
/// Returns false when the stream should end: the consumer disconnected or
/// a stop was requested while waiting. A chunk held here when stop arrives
/// is discarded, never emitted.
fn emit(tx: &mpsc::Sender<Vec<u8>>, run_state: &PipelineRunState, chunk: Vec<u8>) -> bool {
    let mut pending = chunk;
    while run_state.is_running() {
        match tx.try_send(pending) {
            Ok(()) => return true,
            Err(TrySendError::Full(back)) => {
                pending = back;
                thread::sleep(EMIT_POLL_INTERVAL);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("stream consumer disconnected");
                return false;
            }
        }
    }
    false
}
