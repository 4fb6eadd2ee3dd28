//! Draw detections onto a copy of the frame for visual inspection.

use crate::frame::Frame;
use crate::types::BoundingBox;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 3;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("frame buffer does not match its dimensions")]
    InvalidFrame,
    #[error("encode: {0}")]
    Encode(#[from] image::ImageError),
}

/// Copy of `frame` with a red outline around every face.
pub fn draw_boxes(frame: &Frame, faces: &[BoundingBox]) -> Result<RgbImage, AnnotateError> {
    let mut img = frame.to_image().ok_or(AnnotateError::InvalidFrame)?;
    for face in faces {
        let e = face.edges(frame.width, frame.height);
        draw_rect(&mut img, e.left, e.top, e.right, e.bottom);
    }
    Ok(img)
}

/// PNG of the annotated frame, base64-encoded.
pub fn annotated_png_base64(frame: &Frame, faces: &[BoundingBox]) -> Result<String, AnnotateError> {
    let img = draw_boxes(frame, faces)?;
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
}

/// Write the annotated frame to `path`; the format follows the extension.
pub fn save_annotated(
    frame: &Frame,
    faces: &[BoundingBox],
    path: &Path,
) -> Result<(), AnnotateError> {
    draw_boxes(frame, faces)?.save(path)?;
    Ok(())
}

fn draw_rect(img: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < w && y < h {
            img.put_pixel(x as u32, y as u32, BOX_COLOR);
        }
    };

    for t in 0..BOX_THICKNESS {
        for x in left..=right {
            put(x, top + t);
            put(x, bottom - t);
        }
        for y in top..=bottom {
            put(left + t, y);
            put(right - t, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(w: u32, h: u32) -> Frame {
        Frame::from_rgb(vec![50u8; (w * h * 3) as usize], w, h).unwrap()
    }

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            landmarks: None,
        }
    }

    #[test]
    fn test_outline_drawn_interior_untouched() {
        let frame = gray_frame(40, 40);
        let img = draw_boxes(&frame, &[face(10.0, 10.0, 20.0, 20.0)]).unwrap();

        assert_eq!(*img.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*img.get_pixel(30, 30), BOX_COLOR);
        assert_eq!(*img.get_pixel(12, 20), BOX_COLOR);
        assert_eq!(*img.get_pixel(20, 20), Rgb([50, 50, 50]));
        assert_eq!(*img.get_pixel(5, 5), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_box_past_edge_is_clipped() {
        let frame = gray_frame(20, 20);
        let img = draw_boxes(&frame, &[face(-10.0, -10.0, 100.0, 100.0)]).unwrap();
        assert_eq!(*img.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*img.get_pixel(19, 19), BOX_COLOR);
    }

    #[test]
    fn test_base64_png_decodes() {
        let frame = gray_frame(16, 8);
        let b64 = annotated_png_base64(&frame, &[face(2.0, 2.0, 8.0, 4.0)]).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
