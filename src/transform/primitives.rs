//! Image transform primitives
//!
//! Grayscale normalization, contrast stretching, fit-and-pad resizing and
//! error-diffusion dithering. Every page-derivation mode is built from these.

use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;

use super::types::{ensure_non_empty, ensure_target, Result};

// ============================================================
// Constants
// ============================================================

/// Highest contrast level accepted by [`apply_contrast`]
pub const MAX_CONTRAST_LEVEL: u8 = 8;

/// Percent of the histogram clipped from the dark end per contrast level
const BLACK_CUTOFF_PER_LEVEL: u64 = 3;

/// Base percent clipped from the light end
const WHITE_CUTOFF_BASE: u64 = 3;

/// Additional light-end percent per contrast level
const WHITE_CUTOFF_PER_LEVEL: u64 = 9;

/// Canvas background
const WHITE: Luma<u8> = Luma([255]);

// ============================================================
// Grayscale
// ============================================================

/// Convert any decoded image to 8-bit grayscale.
///
/// Transparent regions are flattened onto white first, so they do not
/// come out black on the page.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    if !img.color().has_alpha() {
        return img.to_luma8();
    }

    let rgba = img.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel.0[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        flattened.put_pixel(
            x,
            y,
            Rgb([blend(pixel.0[0]), blend(pixel.0[1]), blend(pixel.0[2])]),
        );
    }

    DynamicImage::ImageRgb8(flattened).to_luma8()
}

// ============================================================
// Contrast
// ============================================================

/// Cutoff percentages `(black, white)` for a contrast level
pub fn contrast_cutoffs(level: u8) -> (u64, u64) {
    let level = level.min(MAX_CONTRAST_LEVEL) as u64;
    (
        BLACK_CUTOFF_PER_LEVEL * level,
        WHITE_CUTOFF_BASE + WHITE_CUTOFF_PER_LEVEL * level,
    )
}

/// Apply the histogram-clipping contrast stretch.
///
/// Level 0 returns the image unchanged. Higher levels clip more of the
/// histogram from both ends before stretching the remainder to 0..=255.
pub fn apply_contrast(gray: &GrayImage, level: u8) -> GrayImage {
    if level == 0 {
        return gray.clone();
    }

    let (black, white) = contrast_cutoffs(level);
    let lut = autocontrast_lut(&histogram(gray), black, white);
    map_colors(gray, |p| Luma([lut[p.0[0] as usize]]))
}

/// 256-bin luma histogram
pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut bins = [0u64; 256];
    for pixel in gray.pixels() {
        bins[pixel.0[0] as usize] += 1;
    }
    bins
}

/// Build the stretch lookup table after clipping `black_pct` / `white_pct`
/// percent of the pixels from the dark and light ends.
fn autocontrast_lut(bins: &[u64; 256], black_pct: u64, white_pct: u64) -> [u8; 256] {
    let mut h = *bins;
    let total: u64 = h.iter().sum();

    let mut cut = total * black_pct / 100;
    for bin in h.iter_mut() {
        if cut == 0 {
            break;
        }
        let taken = cut.min(*bin);
        *bin -= taken;
        cut -= taken;
    }

    let mut cut = total * white_pct / 100;
    for bin in h.iter_mut().rev() {
        if cut == 0 {
            break;
        }
        let taken = cut.min(*bin);
        *bin -= taken;
        cut -= taken;
    }

    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = i as u8;
    }

    let lo = h.iter().position(|&c| c > 0);
    let hi = h.iter().rposition(|&c| c > 0);
    let (lo, hi) = match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => (lo as f64, hi as f64),
        _ => return lut,
    };

    let scale = 255.0 / (hi - lo);
    let offset = -lo * scale;
    for (i, v) in lut.iter_mut().enumerate() {
        let mapped = (i as f64 * scale + offset).trunc();
        *v = mapped.clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Scale contrast around the mean gray level by `factor`.
///
/// `1.0` leaves the image unchanged; used by the book page path.
pub fn enhance_contrast(gray: &GrayImage, factor: f32) -> GrayImage {
    if (factor - 1.0).abs() < f32::EPSILON || gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }

    let count = gray.width() as f64 * gray.height() as f64;
    let sum: f64 = gray.pixels().map(|p| p.0[0] as f64).sum();
    let mean = (sum / count + 0.5).floor() as f32;

    map_colors(gray, |p| {
        let v = mean + (p.0[0] as f32 - mean) * factor;
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

// ============================================================
// Dithering & Resizing
// ============================================================

/// Floyd-Steinberg dither in place; every pixel becomes 0 or 255
pub fn dither(gray: &mut GrayImage) {
    imageops::dither(gray, &BiLevel);
}

/// Size of the largest aspect-preserving fit of `src` inside `target`
pub fn fit_size(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let scale = f64::min(
        target_w as f64 / src_w as f64,
        target_h as f64 / src_h as f64,
    );
    let w = ((src_w as f64 * scale) as u32).clamp(1, target_w);
    let h = ((src_h as f64 * scale) as u32).clamp(1, target_h);
    (w, h)
}

/// Fit the image inside `target_w x target_h`, optionally dither, and center
/// it on a white canvas of exactly the target size.
pub fn resize_and_pad(
    gray: &GrayImage,
    target_w: u32,
    target_h: u32,
    dithering: bool,
) -> Result<GrayImage> {
    ensure_non_empty(gray.width(), gray.height())?;
    ensure_target(target_w, target_h)?;

    let (new_w, new_h) = fit_size(gray.width(), gray.height(), target_w, target_h);
    let mut resized = if (new_w, new_h) == gray.dimensions() {
        gray.clone()
    } else {
        imageops::resize(gray, new_w, new_h, FilterType::Lanczos3)
    };

    if dithering {
        dither(&mut resized);
    }

    let mut canvas = GrayImage::from_pixel(target_w, target_h, WHITE);
    let x = ((target_w - new_w) / 2) as i64;
    let y = ((target_h - new_h) / 2) as i64;
    imageops::replace(&mut canvas, &resized, x, y);
    Ok(canvas)
}

/// Scale to exactly `target_w` wide, keeping the aspect ratio
pub fn scale_to_width(gray: &GrayImage, target_w: u32) -> Result<GrayImage> {
    ensure_non_empty(gray.width(), gray.height())?;
    ensure_target(target_w, 1)?;

    let new_h = (gray.height() as f64 * target_w as f64 / gray.width() as f64).round();
    let new_h = (new_h as u32).max(1);
    if (target_w, new_h) == gray.dimensions() {
        return Ok(gray.clone());
    }
    Ok(imageops::resize(gray, target_w, new_h, FilterType::Lanczos3))
}
