//! Face detection backends.
//!
//! The pipeline only depends on the [`FaceDetector`] trait: one frame in,
//! zero or more axis-aligned boxes out. [`HaarDetector`] is the shipped
//! OpenCV Haar-cascade implementation; tests substitute scripted
//! detectors.

pub use haar::HaarDetector;

use video_ingest::Frame;

mod haar;

/// Bounding box of a detected face within a frame, in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Tuning options recognized by every detector backend.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// Per-scan downscale step; must be greater than 1.0.
    pub scale_factor: f64,
    /// False-positive suppression via detection clustering; at least 1.
    pub min_neighbors: i32,
    /// Lower bound (width, height) on a detectable region.
    pub min_size: (i32, i32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (30, 30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("failed to load cascade model {path:?}")]
    LoadCascade { path: String },
    #[error("scale factor must be > 1.0 and min neighbors >= 1")]
    InvalidConfig,
}

/// Pluggable per-frame classifier.
///
/// Implementations must not mutate the frame and must be deterministic for
/// identical frame bytes and configuration. A backend that cannot process
/// a frame reports no detections rather than failing the pipeline.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<BoundingBox>;
}
