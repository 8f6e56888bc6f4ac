//! Draws detection boxes and the count/alarm overlays onto a frame copy.
//!
//! Pure function of its inputs: the capture buffer is converted into a
//! private RGBA image, mutated, and handed to the encoder. Text rendering
//! uses a small built-in 5x7 glyph set so the hot path stays free of font
//! rasterization dependencies.

use face_detect::BoundingBox;
use image::{ImageBuffer, Rgba};
use video_ingest::{Frame, FrameFormat};

use crate::monitor::{encoding::EncodeError, state::Occupancy};

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const COUNT_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const ALARM_ON_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const ALARM_OFF_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Render detections and occupancy status onto a copy of `frame`.
pub(crate) fn annotate(
    frame: &Frame,
    detections: &[BoundingBox],
    occupancy: Occupancy,
) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>, EncodeError> {
    if !matches!(frame.format, FrameFormat::Bgr8) {
        return Err(EncodeError::MalformedFrame);
    }
    let width = frame.width as u32;
    let height = frame.height as u32;
    if frame.data.len() != (width * height * 3) as usize {
        return Err(EncodeError::MalformedFrame);
    }

    let rgba = bgr_to_rgba(&frame.data);
    let mut image =
        ImageBuffer::from_vec(width, height, rgba).ok_or(EncodeError::MalformedFrame)?;

    for bbox in detections {
        draw_rectangle(
            &mut image,
            bbox.x,
            bbox.y,
            bbox.x + bbox.width,
            bbox.y + bbox.height,
            BOX_COLOR,
        );
    }

    let count_text = format!("People Count: {}", occupancy.count);
    draw_label(&mut image, 10, 10, &count_text, COUNT_COLOR);

    let (status_text, status_color) = if occupancy.alarm {
        ("Alarm: TRIGGERED!", ALARM_ON_COLOR)
    } else {
        ("Alarm: OFF", ALARM_OFF_COLOR)
    };
    draw_label(&mut image, 10, 24, status_text, status_color);

    Ok(image)
}

fn bgr_to_rgba(input: &[u8]) -> Vec<u8> {
    let pixels = input.len() / 3;
    let mut output = Vec::with_capacity(pixels * 4);
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
        output.push(255);
    }
    output
}

fn draw_rectangle(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn draw_label(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    mut x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < width {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += 6;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'G' => Some([
            0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111,
        ]),
        'I' => Some([
            0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'T' => Some([
            0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        ':' => Some([0b00000, 0b00110, 0b00110, 0b00000, 0b00110, 0b00110, 0b00000]),
        '!' => Some([0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00000, 0b00100]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use face_detect::BoundingBox;
    use image::Rgba;

    use super::{annotate, ALARM_ON_COLOR, BOX_COLOR, COUNT_COLOR};
    use crate::monitor::{state::Occupancy, testutil::test_frame};
    use video_ingest::{Frame, FrameFormat};

    #[test]
    fn draws_box_edges_in_green() {
        let frame = test_frame(64, 48);
        let bbox = BoundingBox {
            x: 8,
            y: 36,
            width: 16,
            height: 10,
        };
        let image = annotate(&frame, &[bbox], Occupancy::default()).expect("annotate failed");
        assert_eq!(*image.get_pixel(8, 36), BOX_COLOR);
        assert_eq!(*image.get_pixel(24, 46), BOX_COLOR);
        assert_eq!(*image.get_pixel(16, 40), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn count_overlay_is_rendered() {
        let frame = test_frame(128, 48);
        let image = annotate(&frame, &[], Occupancy::default()).expect("annotate failed");
        // 'P' of "People Count" has its top-left pixel set at the label origin.
        assert_eq!(*image.get_pixel(10, 10), COUNT_COLOR);
    }

    #[test]
    fn alarm_overlay_switches_color_when_triggered() {
        let frame = test_frame(128, 48);
        let triggered = Occupancy {
            count: 3,
            alarm: true,
        };
        let image = annotate(&frame, &[], triggered).expect("annotate failed");
        // 'A' of "Alarm" starts one column in on its top row.
        assert_eq!(*image.get_pixel(11, 24), ALARM_ON_COLOR);
    }

    #[test]
    fn rejects_malformed_buffers() {
        let frame = Frame {
            data: vec![0u8; 17],
            width: 64,
            height: 48,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        assert!(annotate(&frame, &[], Occupancy::default()).is_err());
    }
}
