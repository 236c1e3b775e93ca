//! Per-pixel maximum projection over the analysis window, and its
//! false-colour PNG artifact.
//!
//! The first frame initialises the projection; every later frame of the
//! same shape is folded in with a pixel-wise `max`.  Because `max` is
//! commutative and associative the result does not depend on frame order.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma, Rgb, RgbImage};
use log::{info, warn};

use crate::app::metrics::RunId;
use crate::error::StoreError;
use crate::sensors::BrightnessGrid;

#[derive(Debug, Clone, Default)]
pub struct HeatmapAccumulator {
    grid: Option<BrightnessGrid>,
    frames: u64,
    rejected: u64,
}

impl HeatmapAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the projection.  Returns `false` (and leaves the
    /// projection untouched) when the frame's shape differs from the first.
    pub fn accumulate(&mut self, frame: &BrightnessGrid) -> bool {
        match &mut self.grid {
            None => {
                self.grid = Some(frame.clone());
            }
            Some(acc) => {
                if acc.dimensions() != frame.dimensions() {
                    self.rejected += 1;
                    if self.rejected == 1 {
                        warn!(
                            "heatmap: frame shape {:?} differs from {:?}; skipping",
                            frame.dimensions(),
                            acc.dimensions()
                        );
                    }
                    return false;
                }
                for (a, f) in acc.pixels_mut().zip(frame.pixels()) {
                    a.0[0] = a.0[0].max(f.0[0]);
                }
            }
        }
        self.frames += 1;
        true
    }

    pub fn grid(&self) -> Option<&BrightnessGrid> {
        self.grid.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_none()
    }

    /// Percentage of pixels whose maximum strictly exceeds `threshold`.
    pub fn pct_above(&self, threshold: f32) -> Option<f32> {
        let grid = self.grid.as_ref()?;
        let total = grid.width() as usize * grid.height() as usize;
        if total == 0 {
            return Some(0.0);
        }
        let above = grid.pixels().filter(|p| p.0[0] > threshold).count();
        Some(100.0 * above as f32 / total as f32)
    }

    /// Min-max normalise the projection and map it through the jet ramp.
    pub fn render(&self) -> Option<RgbImage> {
        let grid = self.grid.as_ref()?;
        let (lo, hi) = grid
            .pixels()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.0[0]), hi.max(p.0[0]))
            });
        let span = hi - lo;
        let normalised: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_fn(grid.width(), grid.height(), |x, y| {
                let v = grid.get_pixel(x, y).0[0];
                let n = if span > 0.0 { (v - lo) / span * 255.0 } else { 0.0 };
                Luma([n.round().clamp(0.0, 255.0) as u8])
            });
        Some(ImageBuffer::from_fn(grid.width(), grid.height(), |x, y| {
            Rgb(jet(normalised.get_pixel(x, y).0[0]))
        }))
    }

    /// Write the rendered projection to `dir/heatmap_<run>.png`.
    ///
    /// Returns `Ok(None)` when no frame was accumulated.
    pub fn write_png(&self, dir: &Path, run_id: &RunId) -> Result<Option<PathBuf>, StoreError> {
        let Some(img) = self.render() else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(heatmap_file_name(run_id));
        img.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        info!("heatmap written to {}", path.display());
        Ok(Some(path))
    }
}

pub fn heatmap_file_name(run_id: &RunId) -> String {
    format!("heatmap_{}.png", run_id.file_stem())
}

/// Jet colour ramp: dark blue → cyan → yellow → dark red.
pub fn jet(v: u8) -> [u8; 3] {
    let x = f32::from(v) / 255.0;
    let channel = |centre: f32| ((1.5 - (4.0 * x - centre).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(3.0), channel(2.0), channel(1.0)]
}
