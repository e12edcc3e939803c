//! Box overlays for recognition results.
//!
//! Known faces are outlined in green, unknown faces in red.

use crate::types::{BoundingBox, MatchResult};
use image::{DynamicImage, ImageResult, Rgb, RgbImage};
use std::path::Path;

const KNOWN: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN: Rgb<u8> = Rgb([255, 0, 0]);
const THICKNESS: u32 = 2;

/// Copy of `image` with a box drawn around every face in `results`.
pub fn draw_results(image: &DynamicImage, results: &[MatchResult]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for result in results {
        let color = if result.is_match() { KNOWN } else { UNKNOWN };
        draw_box(&mut canvas, &result.location, color);
    }
    canvas
}

/// Decode `input`, draw `results` on it, and save to `output`. The output
/// format follows the extension of `output`.
pub fn annotate_file(input: &Path, output: &Path, results: &[MatchResult]) -> ImageResult<()> {
    let image = image::open(input)?;
    draw_results(&image, results).save(output)
}

fn draw_box(canvas: &mut RgbImage, location: &BoundingBox, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let (x0, x1) = (location.left.min(location.right), location.left.max(location.right));
    let (y0, y1) = (location.top.min(location.bottom), location.top.max(location.bottom));
    if x1 < 0 || y1 < 0 || x0 >= width as i32 || y0 >= height as i32 {
        return;
    }

    let clamp = |v: i32, max: u32| v.clamp(0, max as i32 - 1) as u32;
    let (left, right) = (clamp(x0, width), clamp(x1, width));
    let (top, bottom) = (clamp(y0, height), clamp(y1, height));

    for t in 0..THICKNESS {
        let (ty, by) = ((top + t).min(bottom), bottom.saturating_sub(t).max(top));
        for x in left..=right {
            canvas.put_pixel(x, ty, color);
            canvas.put_pixel(x, by, color);
        }
        let (lx, rx) = ((left + t).min(right), right.saturating_sub(t).max(left));
        for y in top..=bottom {
            canvas.put_pixel(lx, y, color);
            canvas.put_pixel(rx, y, color);
        }
    }
}
