//! JPEG serialization and multipart chunk framing for the MJPEG stream.

use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageBuffer, Rgba};
use thiserror::Error;

/// Boundary token shared by the stream content type and every chunk.
pub(crate) const STREAM_BOUNDARY: &str = "frame";

#[derive(Debug, Error)]
pub(crate) enum EncodeError {
    #[error("frame buffer does not match its stated dimensions")]
    MalformedFrame,
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Serialize an annotated frame into JPEG bytes.
pub(crate) fn encode_jpeg(
    image: ImageBuffer<Rgba<u8>, Vec<u8>>,
    quality: u8,
) -> Result<Vec<u8>, EncodeError> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(buffer)
}

/// Wrap encoded bytes so sequential chunks are individually decodable by a
/// standard multipart-stream consumer.
pub(crate) fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let mut chunk = Vec::with_capacity(jpeg.len() + 64);
    chunk.extend_from_slice(b"--frame\r\n");
    chunk.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    chunk.extend_from_slice(jpeg);
    chunk.extend_from_slice(b"\r\n");
    chunk
}
