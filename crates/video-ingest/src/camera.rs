//! OpenCV-backed camera source.

use anyhow::anyhow;
use chrono::Utc;
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::warn;

use crate::types::{CaptureError, Frame, FrameFormat, FrameSource};

/// Exclusive handle over one capture device.
///
/// Frames are resized to `target_size` (width, height) before being handed
/// to the caller, so downstream stages always see a fixed geometry. The
/// handle is released by [`FrameSource::close`] or, failing that, on drop.
pub struct CameraSource {
    cap: Option<VideoCapture>,
    target_size: (i32, i32),
    scratch: Mat,
}

impl CameraSource {
    /// Open a camera by index (`0`, `/dev/video0`) or by file/stream URI.
    pub fn open(uri: &str, target_size: (i32, i32)) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, 30.0);
        Ok(Self {
            cap: Some(cap),
            target_size,
            scratch: Mat::default(),
        })
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let cap = self.cap.as_mut().ok_or(CaptureError::EndOfStream)?;

        let mut mat = Mat::default();
        let grabbed = cap
            .read(&mut mat)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(CaptureError::EndOfStream);
        }

        let size = mat.size().map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::Other(anyhow!(
                "capture produced an empty frame"
            )));
        }

        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &mat,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &mat
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }

    fn close(&mut self) {
        if let Some(mut cap) = self.cap.take() {
            if let Err(err) = cap.release() {
                warn!("failed to release capture device: {err}");
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    let stripped = uri.strip_prefix("/dev/video")?;
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        stripped.parse::<i32>().ok()
    } else {
        None
    }
}

/// Attempt to open a camera input either by index or URI, preferring V4L.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply common capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    if let Ok(fourcc) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, fourcc as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}

#[cfg(test)]
mod tests {
    use super::parse_device_index;

    #[test]
    fn parses_bare_indices() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("3"), Some(3));
    }

    #[test]
    fn parses_dev_video_paths() {
        assert_eq!(parse_device_index("/dev/video0"), Some(0));
        assert_eq!(parse_device_index("/dev/video12"), Some(12));
    }

    #[test]
    fn rejects_non_device_uris() {
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("rtsp://cam.local/stream"), None);
        assert_eq!(parse_device_index("clip.mp4"), None);
    }
}
