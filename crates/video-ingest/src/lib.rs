//! Camera capture for the occupancy monitor.
//!
//! Exposes a narrow [`FrameSource`] contract (read a frame, close the
//! device) plus the OpenCV-backed [`CameraSource`] that implements it. The
//! pipeline owns the source exclusively; nothing in this crate shares the
//! device handle.

pub use camera::CameraSource;
pub use types::{CaptureError, Frame, FrameFormat, FrameSource};

mod camera;
mod types;
