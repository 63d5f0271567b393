//! Long-strip reflow
//!
//! Treats a chapter's images as one continuous vertical strip (webcomic
//! layout) and cuts it into fixed-height windows with a configurable overlap,
//! instead of producing one page per source image.

use image::imageops;
use image::{GrayImage, Luma};

use super::primitives::{dither, scale_to_width};
use super::types::{ensure_target, Result, TransformError};

/// Step used when the overlap leaves no forward progress
const FALLBACK_STEP: u32 = 10;

/// One scaled source image and its position on the virtual strip
#[derive(Debug, Clone)]
struct StripSegment {
    image: GrayImage,
    start_y: u64,
    end_y: u64,
}

/// Vertically stacked images, all scaled to the page width
#[derive(Debug, Clone)]
pub struct LongStrip {
    width: u32,
    segments: Vec<StripSegment>,
    total_height: u64,
}

impl LongStrip {
    /// Stack normalized grayscale images, scaling each to `target_w` wide
    pub fn new(images: &[GrayImage], target_w: u32) -> Result<Self> {
        ensure_target(target_w, 1)?;

        let mut segments = Vec::with_capacity(images.len());
        let mut cursor = 0u64;
        for img in images {
            let scaled = scale_to_width(img, target_w)?;
            let height = scaled.height() as u64;
            segments.push(StripSegment {
                image: scaled,
                start_y: cursor,
                end_y: cursor + height,
            });
            cursor += height;
        }

        Ok(Self {
            width: target_w,
            segments,
            total_height: cursor,
        })
    }

    /// Height of the virtual strip in pixels
    pub fn total_height(&self) -> u64 {
        self.total_height
    }

    /// `[start_y, end_y)` of every stacked image
    pub fn segment_ranges(&self) -> Vec<(u64, u64)> {
        self.segments.iter().map(|s| (s.start_y, s.end_y)).collect()
    }

    /// Vertical advance between windows for a given overlap fraction
    pub fn window_step(window_h: u32, overlap: f32) -> u32 {
        let overlap_px = (window_h as f64 * overlap as f64).floor() as i64;
        let step = window_h as i64 - overlap_px;
        if step <= 0 {
            FALLBACK_STEP
        } else {
            step as u32
        }
    }

    /// Window start offsets covering the whole strip
    pub fn window_starts(&self, window_h: u32, overlap: f32) -> Vec<u64> {
        let step = Self::window_step(window_h, overlap) as u64;
        (0..)
            .map(|i| i * step)
            .take_while(|&y| y < self.total_height)
            .collect()
    }

    /// Composite one `width x window_h` window starting at `start_y`
    pub fn render_window(&self, start_y: u64, window_h: u32) -> GrayImage {
        let mut canvas = GrayImage::from_pixel(self.width, window_h, Luma([255]));
        let end_y = start_y + window_h as u64;

        for seg in &self.segments {
            if seg.end_y <= start_y || seg.start_y >= end_y {
                continue;
            }
            let visible_top = seg.start_y.max(start_y);
            let visible_bottom = seg.end_y.min(end_y);

            let src_y = (visible_top - seg.start_y) as u32;
            let rows = (visible_bottom - visible_top) as u32;
            let slice = imageops::crop_imm(&seg.image, 0, src_y, self.width, rows).to_image();
            let dest_y = (visible_top - start_y) as i64;
            imageops::replace(&mut canvas, &slice, 0, dest_y);
        }

        canvas
    }

    /// Cut the strip into pages, optionally dithering each one
    pub fn pages(&self, window_h: u32, overlap: f32, dithering: bool) -> Result<Vec<GrayImage>> {
        ensure_target(self.width, window_h)?;
        if self.segments.is_empty() {
            return Err(TransformError::EmptyStrip);
        }

        let pages = self
            .window_starts(window_h, overlap)
            .into_iter()
            .map(|y| {
                let mut page = self.render_window(y, window_h);
                if dithering {
                    dither(&mut page);
                }
                page
            })
            .collect();
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([value]))
    }

    // LS-001: images stack at the page width
    #[test]
    fn test_strip_layout() {
        let strip = LongStrip::new(&[solid(100, 300, 0), solid(50, 100, 0)], 100).unwrap();
        assert_eq!(strip.segment_ranges(), vec![(0, 300), (300, 500)]);
        assert_eq!(strip.total_height(), 500);
    }

    #[test]
    fn test_window_step() {
        assert_eq!(LongStrip::window_step(800, 0.1), 720);
        assert_eq!(LongStrip::window_step(800, 0.0), 800);
        assert_eq!(LongStrip::window_step(800, 1.0), 10);
        assert_eq!(LongStrip::window_step(800, 1.5), 10);
    }

    // LS-002: windows advance by the step until the strip ends
    #[test]
    fn test_window_starts() {
        let strip = LongStrip::new(&[solid(100, 250, 0)], 100).unwrap();
        assert_eq!(strip.window_starts(100, 0.2), vec![0, 80, 160, 240]);
    }

    // LS-003: windows spanning an image boundary composite both images
    #[test]
    fn test_render_window_across_boundary() {
        let strip = LongStrip::new(&[solid(10, 30, 0), solid(10, 30, 100)], 10).unwrap();
        let page = strip.render_window(20, 20);

        assert_eq!(page.get_pixel(5, 0).0[0], 0);
        assert_eq!(page.get_pixel(5, 9).0[0], 0);
        assert_eq!(page.get_pixel(5, 10).0[0], 100);
        assert_eq!(page.get_pixel(5, 19).0[0], 100);
    }

    #[test]
    fn test_last_window_padded_white() {
        let strip = LongStrip::new(&[solid(10, 25, 0)], 10).unwrap();
        let pages = strip.pages(20, 0.0, false).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].get_pixel(5, 4).0[0], 0);
        assert_eq!(pages[1].get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn test_empty_strip() {
        let strip = LongStrip::new(&[], 10).unwrap();
        assert!(matches!(strip.pages(20, 0.1, false), Err(TransformError::EmptyStrip)));
    }
}
