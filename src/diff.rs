//! Pixel diff between a baseline and a candidate capture.
//!
//! A pixel counts as differing when its largest RGBA channel delta exceeds
//! the per-pixel threshold; the aggregate distance is the fraction of
//! differing pixels. Dimensions must match exactly. Captures are never
//! resized: a size change is a layout regression, not noise.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DiffOptions {
    /// Per-pixel channel delta that marks a pixel as differing, as a
    /// fraction of full scale (0.10 = 25/255).
    pub pixel_threshold: f32,
    /// Largest differing-pixel fraction that still passes.
    pub max_distance: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            pixel_threshold: 0.10,
            max_distance: 0.001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffResult {
    /// Fraction of pixels whose channel delta exceeded the threshold.
    pub distance: f64,
    pub passed: bool,
    pub differing: u64,
    pub total: u64,
    /// Highlight image for triage; present only on failure.
    pub diff_image: Option<RgbaImage>,
}

pub fn diff(
    baseline: &RgbaImage,
    candidate: &RgbaImage,
    options: &DiffOptions,
) -> Result<DiffResult> {
    if baseline.dimensions() != candidate.dimensions() {
        return Err(HarnessError::DimensionMismatch {
            baseline: baseline.dimensions(),
            candidate: candidate.dimensions(),
        });
    }

    let eps = channel_epsilon(options.pixel_threshold);
    let total = u64::from(baseline.width()) * u64::from(baseline.height());
    if total == 0 {
        return Ok(DiffResult {
            distance: 0.0,
            passed: true,
            differing: 0,
            total: 0,
            diff_image: None,
        });
    }

    let mut differing: u64 = 0;
    for (base_px, cand_px) in baseline.pixels().zip(candidate.pixels()) {
        if max_channel_delta(base_px, cand_px) > eps {
            differing += 1;
        }
    }

    let distance = differing as f64 / total as f64;
    let passed = distance <= options.max_distance;
    let diff_image = if passed {
        None
    } else {
        Some(render_highlight(baseline, candidate, eps))
    };

    Ok(DiffResult {
        distance,
        passed,
        differing,
        total,
        diff_image,
    })
}

fn channel_epsilon(pixel_threshold: f32) -> u8 {
    (pixel_threshold.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn max_channel_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> u8 {
    let mut max_diff = 0u8;
    for channel in 0..4 {
        let diff = i16::from(a.0[channel]) - i16::from(b.0[channel]);
        let abs_diff = diff.unsigned_abs() as u8;
        if abs_diff > max_diff {
            max_diff = abs_diff;
        }
    }
    max_diff
}

/// Candidate washed out to light gray, differing pixels painted red.
fn render_highlight(baseline: &RgbaImage, candidate: &RgbaImage, eps: u8) -> RgbaImage {
    let mut out = RgbaImage::new(candidate.width(), candidate.height());
    for (x, y, cand_px) in candidate.enumerate_pixels() {
        let base_px = baseline.get_pixel(x, y);
        let px = if max_channel_delta(base_px, cand_px) > eps {
            Rgba([230, 30, 30, 255])
        } else {
            let luma = (u32::from(cand_px.0[0]) * 299
                + u32::from(cand_px.0[1]) * 587
                + u32::from(cand_px.0[2]) * 114)
                / 1000;
            let faded = 192 + (luma / 4) as u8;
            Rgba([faded, faded, faded, 255])
        };
        out.put_pixel(x, y, px);
    }
    out
}
