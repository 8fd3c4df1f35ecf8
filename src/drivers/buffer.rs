use std::fmt;
use image::{imageops, Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use crate::error::{OverlayError, Result};
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}
impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
    pub fn bytes_per_frame(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
    pub fn contains(&self, other: Resolution) -> bool {
        other.width <= self.width && other.height <= self.height
    }
}
impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
/// Rectangle cut out of every frame before the overlay is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
impl CropRegion {
    /// Checks the region once against the source resolution; nothing is clamped.
    pub fn validate(&self, resolution: Resolution) -> Result<()> {
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if self.width == 0
            || self.height == 0
            || right > resolution.width as u64
            || bottom > resolution.height as u64
        {
            return Err(OverlayError::CropOutOfBounds {
                crop: *self,
                resolution,
            });
        }
        Ok(())
    }
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}
impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
/// One decoded video frame. Owned by exactly one stage of the loop at a time.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub pts_seconds: f64,
    pub image: RgbImage,
}
impl Frame {
    pub fn new(index: u64, pts_seconds: f64, image: RgbImage) -> Self {
        Self {
            index,
            pts_seconds,
            image,
        }
    }
    /// Wraps a packed RGB24 buffer as produced by the decoder.
    pub fn from_rgb24(
        index: u64,
        pts_seconds: f64,
        resolution: Resolution,
        data: Vec<u8>,
    ) -> Option<Self> {
        let image = RgbImage::from_raw(resolution.width, resolution.height, data)?;
        Some(Self::new(index, pts_seconds, image))
    }
    pub fn resolution(&self) -> Resolution {
        let (width, height) = self.image.dimensions();
        Resolution::new(width, height)
    }
    /// Caller validated the region against this frame's resolution.
    pub fn crop(&mut self, region: &CropRegion) {
        self.image =
            imageops::crop_imm(&self.image, region.x, region.y, region.width, region.height)
                .to_image();
    }
    pub fn as_rgb24(&self) -> &[u8] {
        self.image.as_raw()
    }
}
/// Fills `[x0, x1) x [y0, y1)` with a solid colour; the rectangle must be inside the image.
pub fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}
/// Alpha-blends `overlay` onto `image` with its top-left corner at `(x, y)`.
pub fn blend_rgba(image: &mut RgbImage, overlay: &RgbaImage, x: u32, y: u32) {
    for (ox, oy, pixel) in overlay.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        if alpha == 0 {
            continue;
        }
        let target = image.get_pixel_mut(x + ox, y + oy);
        for c in 0..3 {
            let blended = (pixel[c] as u32 * alpha + target[c] as u32 * (255 - alpha) + 127) / 255;
            target[c] = blended as u8;
        }
    }
}
