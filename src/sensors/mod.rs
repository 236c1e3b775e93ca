//! Sensor subsystem: the [`Frame`] model, the background [`grabber`] and
//! the [`baseline`] sampler.
//!
//! A frame is a 2-D brightness grid on the 0–255 scale.  Camera-backed
//! sources also keep the colour image so a live preview can be shown; a
//! single photodiode is a 1×1 frame.

pub mod baseline;
pub mod grabber;

use std::time::Instant;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};

use crate::config::Roi;

/// Per-pixel brightness, one `f32` per pixel.
pub type BrightnessGrid = ImageBuffer<Luma<f32>, Vec<f32>>;

// ITU-R BT.601 luma weights.
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// One capture from the optical sensor.
#[derive(Debug, Clone)]
pub struct Frame {
    brightness: BrightnessGrid,
    color: Option<RgbImage>,
    captured_at: Instant,
}

impl Frame {
    /// Wrap an existing brightness grid.
    pub fn from_brightness(brightness: BrightnessGrid) -> Self {
        Self {
            brightness,
            color: None,
            captured_at: Instant::now(),
        }
    }

    /// Convert a colour capture to brightness, keeping the colour image for preview.
    pub fn from_rgb(color: RgbImage) -> Self {
        let brightness = BrightnessGrid::from_fn(color.width(), color.height(), |x, y| {
            let [r, g, b] = color.get_pixel(x, y).0;
            Luma([LUMA_R * f32::from(r) + LUMA_G * f32::from(g) + LUMA_B * f32::from(b)])
        });
        Self {
            brightness,
            color: Some(color),
            captured_at: Instant::now(),
        }
    }

    pub fn from_luma8(gray: &GrayImage) -> Self {
        Self::from_brightness(BrightnessGrid::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([f32::from(gray.get_pixel(x, y).0[0])])
        }))
    }

    /// A frame where every pixel has the same brightness.
    pub fn uniform(width: u32, height: u32, value: f32) -> Self {
        Self::from_brightness(BrightnessGrid::from_pixel(width, height, Luma([value])))
    }

    pub fn brightness(&self) -> &BrightnessGrid {
        &self.brightness
    }

    pub fn color(&self) -> Option<&RgbImage> {
        self.color.as_ref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.brightness.dimensions()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Mean brightness over `roi`, or over the whole frame when `roi` is
    /// `None`.  A region that misses the frame entirely falls back to the
    /// whole frame.  Empty frames report 0.
    pub fn mean_brightness(&self, roi: Option<Roi>) -> f32 {
        let (width, height) = self.dimensions();
        let (x0, y0, x1, y1) = match roi.and_then(|r| clip_roi(r, width, height)) {
            Some(clipped) => clipped,
            None => (0, 0, width, height),
        };
        let count = u64::from(x1 - x0) * u64::from(y1 - y0);
        if count == 0 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for y in y0..y1 {
            for x in x0..x1 {
                sum += f64::from(self.brightness.get_pixel(x, y).0[0]);
            }
        }
        (sum / count as f64) as f32
    }
}

/// Intersect `roi` with a `width`×`height` frame.  `None` when empty.
fn clip_roi(roi: Roi, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = roi.x.min(width);
    let y0 = roi.y.min(height);
    let x1 = roi.x.saturating_add(roi.width).min(width);
    let y1 = roi.y.saturating_add(roi.height).min(height);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}
