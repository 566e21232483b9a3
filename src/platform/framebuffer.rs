//! In-memory RGBA surface for the on-screen display.

use log::{info, warn};

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const RESOLUTION_ENV: &str = "GLFB_RESOLUTION";

/// Parses `<w>,<h>`, falling back to 1280x720.
pub fn parse_resolution(value: Option<&str>) -> (u32, u32) {
    let default = (DEFAULT_WIDTH, DEFAULT_HEIGHT);
    let Some(value) = value else {
        return default;
    };
    let parsed = value
        .split_once(',')
        .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => (w, h),
        _ => {
            warn!("⚠️ invalid {}='{}', using {}x{}", RESOLUTION_ENV, value, default.0, default.1);
            default
        }
    }
}

pub struct Framebuffer {
    width: u32,
    height: u32,
    /// 0xAARRGGBB
    pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_env() -> Self {
        let value = std::env::var(RESOLUTION_ENV).ok();
        let (w, h) = parse_resolution(value.as_deref());
        info!("🖼️ framebuffer {}x{}", w, h);
        Self::new(w, h)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    /// Fills the part of the rectangle that lies on the surface.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: u32) {
        let x_end = x.saturating_add(w).min(self.width) as usize;
        let y_end = y.saturating_add(h).min(self.height) as usize;
        let stride = self.width as usize;
        for row in (y as usize)..y_end {
            if (x as usize) < x_end {
                self.pixels[row * stride + x as usize..row * stride + x_end].fill(color);
            }
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: u32) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution(None), (1280, 720));
        assert_eq!(parse_resolution(Some("1920,1080")), (1920, 1080));
        assert_eq!(parse_resolution(Some(" 720 , 576 ")), (720, 576));
        assert_eq!(parse_resolution(Some("1920x1080")), (1280, 720));
        assert_eq!(parse_resolution(Some("0,576")), (1280, 720));
        assert_eq!(parse_resolution(Some("abc,def")), (1280, 720));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut fb = Framebuffer::new(4, 3);
        fb.clear(0xFF00_0000);
        fb.fill_rect(2, 1, 10, 10, 0xFFFF_FFFF);

        assert_eq!(fb.pixel(1, 1), Some(0xFF00_0000));
        assert_eq!(fb.pixel(2, 1), Some(0xFFFF_FFFF));
        assert_eq!(fb.pixel(3, 2), Some(0xFFFF_FFFF));
        assert_eq!(fb.pixel(2, 0), Some(0xFF00_0000));
        assert_eq!(fb.pixel(4, 0), None);

        // fully outside
        fb.fill_rect(9, 9, 2, 2, 0);
        assert_eq!(fb.pixels().iter().filter(|&&p| p == 0xFFFF_FFFF).count(), 4);
    }

    #[test]
    fn test_set_pixel_out_of_range_is_ignored() {
        let mut fb = Framebuffer::new(2, 2);
        fb.set_pixel(1, 1, 7);
        fb.set_pixel(2, 1, 9);
        assert_eq!(fb.pixel(1, 1), Some(7));
        assert_eq!(fb.pixels(), &[0, 0, 0, 7]);
    }
}
