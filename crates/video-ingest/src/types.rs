use thiserror::Error;

/// Raw BGR frame captured from a video source.
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source returned no frame (end of stream or device fault)")]
    EndOfStream,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A device or file that yields frames on demand.
///
/// `read_frame` blocks until the next frame is available. `close` releases
/// the underlying handle and must be idempotent: closing an already closed
/// source is a no-op, and reading after close reports a capture fault
/// rather than panicking.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
    fn close(&mut self);
}
