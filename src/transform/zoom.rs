//! Zoom band splitting
//!
//! Slices a tall page into overlapping horizontal bands. Each band is rotated
//! 90° clockwise so its width runs along the output page height, giving a
//! legible close-up on small screens.
//!
//! # Algorithm
//!
//! 1. `band_height = target_w / (target_h / source_w)`: the source rows that
//!    fill one rotated output page
//! 2. Start from the desired band count (3) and spread the bands evenly over
//!    the source height
//! 3. Add bands while neighbouring bands overlap by less than 5%, up to 26

use image::imageops;
use image::GrayImage;
use serde::Serialize;

use super::primitives::resize_and_pad;
use super::types::{ensure_non_empty, ensure_target, Result};

// ============================================================
// Constants
// ============================================================

/// Initial number of bands per page
pub const DESIRED_BANDS: u32 = 3;

/// Upper bound on bands per page
pub const MAX_BANDS: u32 = 26;

/// Minimum overlap between consecutive bands (fraction of band height)
pub const MIN_OVERLAP: f64 = 0.05;

// ============================================================
// Band Planning
// ============================================================

/// Source rows covered by one band, `[top, bottom)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandRange {
    pub top: u32,
    pub bottom: u32,
}

impl BandRange {
    /// Band height in source pixels
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Computed band geometry for one source page
#[derive(Debug, Clone, Serialize)]
pub struct ZoomPlan {
    /// Source rows that fill one output page after rotation
    pub band_height: f64,
    /// Distance between consecutive band tops
    pub shift: f64,
    /// Bands in reading order
    pub bands: Vec<BandRange>,
}

impl ZoomPlan {
    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// True when the plan has no bands
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Overlap between consecutive bands as a fraction of the band height
    pub fn overlap_fraction(&self) -> f64 {
        if self.bands.len() < 2 {
            return 1.0;
        }
        1.0 - self.shift / self.band_height
    }
}

fn band_shift(band_height: f64, source_height: f64, count: u32) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    band_height - (band_height * count as f64 - source_height) / (count - 1) as f64
}

/// Plan zoom bands starting from [`DESIRED_BANDS`]
pub fn plan_zoom_bands(
    source_w: u32,
    source_h: u32,
    target_w: u32,
    target_h: u32,
) -> Result<ZoomPlan> {
    plan_zoom_bands_with(source_w, source_h, target_w, target_h, DESIRED_BANDS)
}

/// Plan zoom bands starting from `desired` bands
pub fn plan_zoom_bands_with(
    source_w: u32,
    source_h: u32,
    target_w: u32,
    target_h: u32,
    desired: u32,
) -> Result<ZoomPlan> {
    ensure_non_empty(source_w, source_h)?;
    ensure_target(target_w, target_h)?;

    let scale = target_h as f64 / source_w as f64;
    let band_height = target_w as f64 / scale;
    let height = source_h as f64;

    // Page fits in one band
    if height <= band_height || desired <= 1 {
        return Ok(ZoomPlan {
            band_height,
            shift: 0.0,
            bands: vec![BandRange {
                top: 0,
                bottom: source_h,
            }],
        });
    }

    let mut count = desired.min(MAX_BANDS);
    let mut shift = band_shift(band_height, height, count);
    while count < MAX_BANDS && shift / band_height > 1.0 - MIN_OVERLAP {
        count += 1;
        shift = band_shift(band_height, height, count);
    }

    let bands = (0..count)
        .map(|v| {
            let top = (shift * v as f64).round().clamp(0.0, height) as u32;
            let bottom = (height - shift * (count - v - 1) as f64)
                .round()
                .clamp(0.0, height) as u32;
            BandRange {
                top,
                bottom: bottom.max(top + 1).min(source_h),
            }
        })
        .collect();

    Ok(ZoomPlan {
        band_height,
        shift,
        bands,
    })
}

// ============================================================
// Band Rendering
// ============================================================

/// Crop a band, rotate it clockwise and fit it to the target page
pub fn render_band(
    gray: &GrayImage,
    band: BandRange,
    target_w: u32,
    target_h: u32,
    dithering: bool,
) -> Result<GrayImage> {
    let crop = imageops::crop_imm(gray, 0, band.top, gray.width(), band.height()).to_image();
    let rotated = imageops::rotate90(&crop);
    resize_and_pad(&rotated, target_w, target_h, dithering)
}

/// Split a normalized grayscale page into rotated zoom pages
pub fn split_zoom_pages(
    gray: &GrayImage,
    target_w: u32,
    target_h: u32,
    dithering: bool,
) -> Result<Vec<GrayImage>> {
    let plan = plan_zoom_bands(gray.width(), gray.height(), target_w, target_h)?;
    tracing::debug!(
        "Zoom plan: {} bands, band height {:.1}, shift {:.1}",
        plan.len(),
        plan.band_height,
        plan.shift
    );

    plan.bands
        .iter()
        .map(|&band| render_band(gray, band, target_w, target_h, dithering))
        .collect()
}
