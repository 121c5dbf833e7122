//! Per-tick composition of the screen and webcam overlay onto one surface

use crate::capture::geometry::{map_rectangle, square_crop, surface_size, Rectangle, Resolution, WebcamAnchor};
use crate::config::OverlayConfig;
use crate::processing::surface::Surface;
use image::RgbaImage;

/// Where and how the webcam overlay is drawn. Computed once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    /// Square crop in camera pixels
    pub crop: Rectangle,
    /// Bounding square of the circle on the surface
    pub target: Rectangle,
    pub border_width: f64,
    pub border_color: [u8; 4],
}

impl OverlayLayout {
    pub fn new(camera: Resolution, surface: Resolution, anchor: WebcamAnchor, config: &OverlayConfig) -> Self {
        let (x, y) = anchor.offset(surface, config.diameter, config.inset);
        let d = config.diameter as f64;
        Self {
            crop: square_crop(camera),
            target: Rectangle::new(x, y, d, d),
            border_width: config.border_width,
            border_color: config.border_color,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.target.x + self.target.width / 2.0,
            self.target.y + self.target.height / 2.0,
        )
    }

    pub fn radius(&self) -> f64 {
        self.target.width / 2.0
    }
}

/// The area crop in viewport space plus the viewport it was selected in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaCrop {
    pub selection: Rectangle,
    pub viewport: Resolution,
}

pub struct Compositor {
    surface: Surface,
    area: Option<AreaCrop>,
    overlay: Option<OverlayLayout>,
}

impl Compositor {
    /// Size the surface from the area (when present) or the screen
    pub fn new(screen: Resolution, area: Option<AreaCrop>, overlay: Option<OverlayLayout>) -> Self {
        let size = surface_size(area.as_ref().map(|a| &a.selection), screen);
        Self {
            surface: Surface::new(size),
            area,
            overlay,
        }
    }

    pub fn size(&self) -> Resolution {
        self.surface.size()
    }

    pub fn surface(&self) -> &RgbaImage {
        self.surface.image()
    }

    pub fn overlay(&self) -> Option<&OverlayLayout> {
        self.overlay.as_ref()
    }

    /// Compose one frame from the latest samples
    pub fn draw(&mut self, screen: Option<&RgbaImage>, camera: Option<&RgbaImage>) {
        let target = self.surface.size().as_rect();

        if let Some(screen) = screen {
            let frame_size = Resolution::new(screen.width(), screen.height());
            let src_rect = match &self.area {
                Some(area) => map_rectangle(&area.selection, area.viewport, frame_size),
                None => frame_size.as_rect(),
            };
            self.surface.draw_image(screen, src_rect, target);
        }

        if let (Some(camera), Some(layout)) = (camera, &self.overlay) {
            self.surface.draw_image_in_circle(camera, layout.crop, layout.target);
            self.surface
                .stroke_circle(layout.center(), layout.radius(), layout.border_width, layout.border_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn test_full_recording_matches_screen_size() {
        let compositor = Compositor::new(Resolution::new(1920, 1080), None, None);
        assert_eq!(compositor.size(), Resolution::new(1920, 1080));
    }

    #[test]
    fn test_area_recording_matches_selection_size() {
        let area = AreaCrop {
            selection: Rectangle::new(100.0, 100.0, 640.0, 360.0),
            viewport: Resolution::new(1280, 720),
        };
        let compositor = Compositor::new(Resolution::new(2560, 1440), Some(area), None);
        assert_eq!(compositor.size(), Resolution::new(640, 360));
    }

    #[test]
    fn test_area_crop_uses_source_space() {
        // Screen at 2x the viewport density; the selected viewport quadrant is green
        let screen = RgbaImage::from_fn(200, 200, |x, y| if x >= 100 && y >= 100 { GREEN } else { RED });
        let area = AreaCrop {
            selection: Rectangle::new(50.0, 50.0, 50.0, 50.0),
            viewport: Resolution::new(100, 100),
        };
        let mut compositor = Compositor::new(Resolution::new(200, 200), Some(area), None);
        compositor.draw(Some(&screen), None);

        assert_eq!(compositor.size(), Resolution::new(50, 50));
        assert!(compositor.surface().pixels().all(|p| *p == GREEN));
    }

    #[test]
    fn test_overlay_drawn_with_border() {
        let screen = RgbaImage::from_pixel(400, 300, RED);
        let camera = RgbaImage::from_pixel(640, 480, GREEN);
        let surface = Resolution::new(400, 300);
        let layout = OverlayLayout::new(
            Resolution::new(640, 480),
            surface,
            WebcamAnchor::BottomRight,
            &OverlayConfig::default(),
        );
        assert_eq!(layout.target, Rectangle::new(230.0, 130.0, 150.0, 150.0));
        assert_eq!(layout.crop, Rectangle::new(80.0, 0.0, 480.0, 480.0));

        let mut compositor = Compositor::new(surface, None, Some(layout));
        compositor.draw(Some(&screen), Some(&camera));

        let img = compositor.surface();
        // Circle center shows the camera
        assert_eq!(*img.get_pixel(305, 205), GREEN);
        // Ring on the left edge of the circle is white
        assert_eq!(*img.get_pixel(230, 204), Rgba([255, 255, 255, 255]));
        // Bounding-square corner still shows the screen
        assert_eq!(*img.get_pixel(231, 131), RED);
    }

    #[test]
    fn test_missing_camera_frame_skips_overlay() {
        let screen = RgbaImage::from_pixel(400, 300, RED);
        let layout = OverlayLayout::new(
            Resolution::new(320, 240),
            Resolution::new(400, 300),
            WebcamAnchor::TopLeft,
            &OverlayConfig::default(),
        );
        let mut compositor = Compositor::new(Resolution::new(400, 300), None, Some(layout));
        compositor.draw(Some(&screen), None);

        assert!(compositor.surface().pixels().all(|p| *p == RED));
    }
}
