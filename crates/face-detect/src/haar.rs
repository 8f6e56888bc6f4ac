//! Haar-cascade face detector backed by OpenCV's `CascadeClassifier`.

use std::sync::Mutex;

use opencv::{
    core::{Rect, Size, Vector},
    imgproc,
    objdetect::{CascadeClassifier, CascadeClassifierTrait, CascadeClassifierTraitConst},
    prelude::*,
};
use tracing::warn;

use video_ingest::{Frame, FrameFormat};

use crate::{BoundingBox, DetectError, DetectorConfig, FaceDetector};

/// Classifier wrapper holding the loaded cascade and its tuning.
///
/// `detect_multi_scale` requires mutable access to the classifier, so the
/// handle sits behind a mutex; the pipeline calls `detect` from a single
/// producer thread, making contention a non-issue.
pub struct HaarDetector {
    classifier: Mutex<CascadeClassifier>,
    config: DetectorConfig,
}

impl HaarDetector {
    /// Load a cascade XML model from disk.
    pub fn load(cascade_path: &str, config: DetectorConfig) -> Result<Self, DetectError> {
        if config.scale_factor <= 1.0 || config.min_neighbors < 1 {
            return Err(DetectError::InvalidConfig);
        }

        let classifier = CascadeClassifier::new(cascade_path).map_err(|err| {
            warn!("cascade load failed: {err}");
            DetectError::LoadCascade {
                path: cascade_path.to_string(),
            }
        })?;
        if classifier.empty().unwrap_or(true) {
            return Err(DetectError::LoadCascade {
                path: cascade_path.to_string(),
            });
        }

        Ok(Self {
            classifier: Mutex::new(classifier),
            config,
        })
    }

    fn run_cascade(&self, frame: &Frame) -> opencv::Result<Vec<BoundingBox>> {
        let mat = Mat::from_slice(&frame.data)?;
        let bgr = mat.reshape(3, frame.height)?;
        let mut gray = Mat::default();
        imgproc::cvt_color(&bgr, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut faces: Vector<Rect> = Vector::new();
        let (min_w, min_h) = self.config.min_size;
        let mut classifier = match self.classifier.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        classifier.detect_multi_scale(
            &gray,
            &mut faces,
            self.config.scale_factor,
            self.config.min_neighbors,
            0,
            Size::new(min_w, min_h),
            Size::new(0, 0),
        )?;

        Ok(faces
            .iter()
            .map(|rect| BoundingBox {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            })
            .collect())
    }
}

impl FaceDetector for HaarDetector {
    fn detect(&self, frame: &Frame) -> Vec<BoundingBox> {
        if !matches!(frame.format, FrameFormat::Bgr8) {
            warn!("unsupported frame format for haar detection");
            return Vec::new();
        }
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.data.len() != expected {
            warn!(
                "frame buffer size mismatch: got {} bytes, expected {expected}",
                frame.data.len()
            );
            return Vec::new();
        }

        match self.run_cascade(frame) {
            Ok(boxes) => boxes,
            Err(err) => {
                warn!("haar detection failed, reporting no faces: {err}");
                Vec::new()
            }
        }
    }
}
