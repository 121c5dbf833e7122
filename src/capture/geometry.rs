//! Capture geometry
//!
//! Rectangle math shared by the area selector and the compositor: mapping a
//! selection from viewport pixels to source pixels, the webcam square crop
//! and the overlay anchor offsets.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanning two corner points, in any drag direction
    pub fn from_corners(ax: f64, ay: f64, bx: f64, by: f64) -> Self {
        Self {
            x: ax.min(bx),
            y: ay.min(by),
            width: (bx - ax).abs(),
            height: (by - ay).abs(),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Pixel dimensions of a source, surface or viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_rect(&self) -> Rectangle {
        Rectangle::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Map a rectangle selected in viewport space into source-pixel space.
///
/// Each axis is scaled independently by `source / viewport`. No aspect-ratio
/// correction is applied, so a viewport and source with different pixel
/// aspect ratios produce a stretched crop. A zero viewport axis maps 1:1.
pub fn map_rectangle(selection: &Rectangle, viewport: Resolution, source: Resolution) -> Rectangle {
    let sx = axis_scale(source.width, viewport.width);
    let sy = axis_scale(source.height, viewport.height);

    Rectangle {
        x: selection.x * sx,
        y: selection.y * sy,
        width: selection.width * sx,
        height: selection.height * sy,
    }
}

fn axis_scale(source: u32, viewport: u32) -> f64 {
    if viewport == 0 {
        1.0
    } else {
        source as f64 / viewport as f64
    }
}

/// Center-crop a camera frame to a square using its smaller dimension.
pub fn square_crop(native: Resolution) -> Rectangle {
    let w = native.width as f64;
    let h = native.height as f64;
    if w > h {
        Rectangle::new((w - h) / 2.0, 0.0, h, h)
    } else {
        Rectangle::new(0.0, (h - w) / 2.0, w, w)
    }
}

/// Surface size for a recording: the selected area when present, else the
/// screen's native size.
pub fn surface_size(area: Option<&Rectangle>, screen: Resolution) -> Resolution {
    match area {
        Some(rect) => Resolution::new(round_dimension(rect.width), round_dimension(rect.height)),
        None => screen,
    }
}

fn round_dimension(value: f64) -> u32 {
    value.round().max(1.0) as u32
}

/// Corner the webcam overlay is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum WebcamAnchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
}

impl From<&str> for WebcamAnchor {
    fn from(value: &str) -> Self {
        match value {
            "top-left" => WebcamAnchor::TopLeft,
            "top-right" => WebcamAnchor::TopRight,
            "bottom-left" => WebcamAnchor::BottomLeft,
            "bottom-right" => WebcamAnchor::BottomRight,
            other => {
                tracing::debug!("Unknown webcam anchor {:?}, using bottom-right", other);
                WebcamAnchor::BottomRight
            }
        }
    }
}

impl From<String> for WebcamAnchor {
    fn from(value: String) -> Self {
        WebcamAnchor::from(value.as_str())
    }
}

impl WebcamAnchor {
    /// Top-left corner of the overlay's bounding square on a surface
    pub fn offset(&self, surface: Resolution, diameter: u32, inset: u32) -> (f64, f64) {
        let near = inset as f64;
        let far_x = surface.width as f64 - diameter as f64 - inset as f64;
        let far_y = surface.height as f64 - diameter as f64 - inset as f64;

        match self {
            WebcamAnchor::TopLeft => (near, near),
            WebcamAnchor::TopRight => (far_x, near),
            WebcamAnchor::BottomLeft => (near, far_y),
            WebcamAnchor::BottomRight => (far_x, far_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mapping_returns_input() {
        let sel = Rectangle::new(12.0, 34.0, 200.0, 100.0);
        let res = Resolution::new(1920, 1080);
        assert_eq!(map_rectangle(&sel, res, res), sel);
    }

    #[test]
    fn test_mapping_scales_axes_independently() {
        let sel = Rectangle::new(100.0, 50.0, 400.0, 300.0);
        let mapped = map_rectangle(&sel, Resolution::new(1000, 500), Resolution::new(2000, 2000));

        assert_eq!(mapped, Rectangle::new(200.0, 200.0, 800.0, 1200.0));
    }

    #[test]
    fn test_mapping_is_linear_in_viewport_scale() {
        let sel = Rectangle::new(40.0, 60.0, 120.0, 90.0);
        let source = Resolution::new(2560, 1440);

        let base = map_rectangle(&sel, Resolution::new(1280, 720), source);
        // Doubling viewport and selection yields the same source rectangle
        let doubled = Rectangle::new(80.0, 120.0, 240.0, 180.0);
        let scaled = map_rectangle(&doubled, Resolution::new(2560, 1440), source);

        assert_eq!(base, scaled);
    }

    #[test]
    fn test_zero_viewport_maps_one_to_one() {
        let sel = Rectangle::new(1.0, 2.0, 60.0, 70.0);
        let mapped = map_rectangle(&sel, Resolution::new(0, 0), Resolution::new(800, 600));
        assert_eq!(mapped, sel);
    }

    #[test]
    fn test_square_crop_landscape_and_portrait() {
        assert_eq!(
            square_crop(Resolution::new(640, 480)),
            Rectangle::new(80.0, 0.0, 480.0, 480.0)
        );
        assert_eq!(
            square_crop(Resolution::new(480, 640)),
            Rectangle::new(0.0, 80.0, 480.0, 480.0)
        );
        assert_eq!(
            square_crop(Resolution::new(320, 320)),
            Rectangle::new(0.0, 0.0, 320.0, 320.0)
        );
    }

    #[test]
    fn test_anchor_offsets() {
        let surface = Resolution::new(1920, 1080);
        assert_eq!(WebcamAnchor::TopLeft.offset(surface, 150, 20), (20.0, 20.0));
        assert_eq!(WebcamAnchor::TopRight.offset(surface, 150, 20), (1750.0, 20.0));
        assert_eq!(WebcamAnchor::BottomLeft.offset(surface, 150, 20), (20.0, 910.0));
        assert_eq!(
            WebcamAnchor::BottomRight.offset(surface, 150, 20),
            (1750.0, 910.0)
        );
    }

    #[test]
    fn test_unknown_anchor_defaults_to_bottom_right() {
        let anchor: WebcamAnchor = serde_json::from_str("\"center\"").unwrap();
        assert_eq!(anchor, WebcamAnchor::BottomRight);

        let anchor: WebcamAnchor = serde_json::from_str("\"top-left\"").unwrap();
        assert_eq!(anchor, WebcamAnchor::TopLeft);
        assert_eq!(serde_json::to_string(&anchor).unwrap(), "\"top-left\"");
    }

    #[test]
    fn test_surface_size() {
        let screen = Resolution::new(2880, 1800);
        assert_eq!(surface_size(None, screen), screen);

        let area = Rectangle::new(10.0, 10.0, 640.4, 359.6);
        assert_eq!(surface_size(Some(&area), screen), Resolution::new(640, 360));
    }

    #[test]
    fn test_from_corners_normalizes_direction() {
        let rect = Rectangle::from_corners(300.0, 200.0, 100.0, 50.0);
        assert_eq!(rect, Rectangle::new(100.0, 50.0, 200.0, 150.0));
    }
}
