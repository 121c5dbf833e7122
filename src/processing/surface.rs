//! Compositing surface
//!
//! An RGBA raster supporting the three operations the compositor needs:
//! scaled image draws, draws clipped to a circle and circle strokes.

use crate::capture::geometry::{Rectangle, Resolution};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

pub struct Surface {
    image: RgbaImage,
}

impl Surface {
    /// Opaque black surface
    pub fn new(size: Resolution) -> Self {
        Self {
            image: RgbaImage::from_pixel(size.width, size.height, Rgba([0, 0, 0, 255])),
        }
    }

    pub fn size(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Draw `src_rect` of `src` scaled into `dst_rect` of the surface.
    ///
    /// Source rectangles reaching past the image are clipped to it, like a
    /// canvas `drawImage` with out-of-range source coordinates.
    pub fn draw_image(&mut self, src: &RgbaImage, src_rect: Rectangle, dst_rect: Rectangle) {
        let Some(scaled) = scale_region(src, src_rect, dst_rect) else {
            return;
        };
        imageops::replace(
            &mut self.image,
            &scaled,
            dst_rect.x.round() as i64,
            dst_rect.y.round() as i64,
        );
    }

    /// Draw `src_rect` of `src` into the square `dst_rect`, keeping only the
    /// pixels inside the inscribed circle.
    pub fn draw_image_in_circle(&mut self, src: &RgbaImage, src_rect: Rectangle, dst_rect: Rectangle) {
        let Some(scaled) = scale_region(src, src_rect, dst_rect) else {
            return;
        };

        let origin_x = dst_rect.x.round() as i64;
        let origin_y = dst_rect.y.round() as i64;
        let radius = scaled.width().min(scaled.height()) as f64 / 2.0;
        let (cx, cy) = (scaled.width() as f64 / 2.0, scaled.height() as f64 / 2.0);

        for (x, y, pixel) in scaled.enumerate_pixels() {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let tx = origin_x + x as i64;
            let ty = origin_y + y as i64;
            if tx < 0 || ty < 0 || tx >= self.image.width() as i64 || ty >= self.image.height() as i64 {
                continue;
            }
            self.image.put_pixel(tx as u32, ty as u32, *pixel);
        }
    }

    /// Stroke a ring of `line_width` centred on the circle boundary
    pub fn stroke_circle(&mut self, center: (f64, f64), radius: f64, line_width: f64, color: [u8; 4]) {
        let half = line_width / 2.0;
        let outer = radius + half;

        let min_x = (center.0 - outer).floor().max(0.0) as u32;
        let min_y = (center.1 - outer).floor().max(0.0) as u32;
        let max_x = ((center.0 + outer).ceil().max(0.0) as u32).min(self.image.width());
        let max_y = ((center.1 + outer).ceil().max(0.0) as u32).min(self.image.height());

        for y in min_y..max_y {
            for x in min_x..max_x {
                let dx = x as f64 + 0.5 - center.0;
                let dy = y as f64 + 0.5 - center.1;
                let distance = (dx * dx + dy * dy).sqrt();
                if (distance - radius).abs() <= half {
                    self.image.put_pixel(x, y, Rgba(color));
                }
            }
        }
    }
}

/// Crop `src_rect` out of `src` (clipped to the image) and scale it to the
/// destination size.
fn scale_region(src: &RgbaImage, src_rect: Rectangle, dst_rect: Rectangle) -> Option<RgbaImage> {
    let x0 = src_rect.x.max(0.0).floor() as u32;
    let y0 = src_rect.y.max(0.0).floor() as u32;
    let x1 = ((src_rect.x + src_rect.width).ceil().max(0.0) as u32).min(src.width());
    let y1 = ((src_rect.y + src_rect.height).ceil().max(0.0) as u32).min(src.height());
    let dst_w = dst_rect.width.round() as u32;
    let dst_h = dst_rect.height.round() as u32;

    if x1 <= x0 || y1 <= y0 || dst_w == 0 || dst_h == 0 {
        return None;
    }

    let crop = imageops::crop_imm(src, x0, y0, x1 - x0, y1 - y0).to_image();
    if crop.dimensions() == (dst_w, dst_h) {
        return Some(crop);
    }
    Some(imageops::resize(&crop, dst_w, dst_h, FilterType::Triangle))
}
