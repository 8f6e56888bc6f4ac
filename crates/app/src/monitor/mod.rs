//! Capture → detect → count → annotate → encode → stream pipeline and the
//! HTTP surface that republishes it.
//!
//! The module is split into focused submodules:
//! - `state`: shared occupancy count/alarm pair and the run-state machine.
//! - `pipeline`: the producer loop and its start/stop lifecycle.
//! - `annotation`: bounding boxes and status overlays drawn on frame copies.
//! - `encoding`: JPEG serialization and multipart chunk framing.
//! - `server`: Actix Web routes (`/video_feed`, `/get_count`,
//!   `/stop_detection`, `/metrics`) behind a boolean authorization
//!   capability.
//! - `telemetry`: tracing and Prometheus metrics wiring.

pub(crate) use pipeline::{PipelineController, SourceFactory};

mod annotation;
mod encoding;
mod pipeline;
pub(crate) mod server;
mod state;
pub(crate) mod telemetry;

#[cfg(test)]
pub(crate) mod testutil {
    use std::{thread, time::Duration};

    use face_detect::{BoundingBox, FaceDetector};
    use video_ingest::{CaptureError, Frame, FrameFormat, FrameSource};

    /// Solid-black BGR frame with a valid buffer for its dimensions.
    pub(crate) fn test_frame(width: i32, height: i32) -> Frame {
        Frame {
            data: vec![0u8; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    /// Endless source pacing itself like a slow camera.
    pub(crate) struct StaticSource;

    impl FrameSource for StaticSource {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            thread::sleep(Duration::from_millis(2));
            Ok(test_frame(64, 48))
        }

        fn close(&mut self) {}
    }

    /// Detector reporting a fixed number of faces for every frame.
    pub(crate) struct FixedDetector(pub(crate) usize);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _frame: &Frame) -> Vec<BoundingBox> {
            (0..self.0)
                .map(|i| BoundingBox {
                    x: (i as i32) * 12,
                    y: 4,
                    width: 10,
                    height: 10,
                })
                .collect()
        }
    }
}
