//! Page derivation module
//!
//! Turns arbitrary source rasters into fixed-size grayscale pages ready for
//! XTG encoding.
//!
//! # Modes
//!
//! - **Main** - one upright page per source image, fitted and padded
//! - **Zoom** ([`zoom`]) - overlapping horizontal bands, rotated 90° clockwise
//! - **Long strip** ([`strip`]) - images stacked into one strip and re-cut into
//!   overlapping windows
//!
//! # Example
//!
//! ```rust,no_run
//! use xtc_convert::{PageTransformer, Settings};
//!
//! let img = image::open("page_001.png").unwrap();
//! let transformer = PageTransformer::new(&Settings::default());
//!
//! let main = transformer.main_page(&img).unwrap();
//! let zoom = transformer.zoom_pages(&img).unwrap();
//! println!("1 main page, {} zoom pages", zoom.len());
//! # let _ = main;
//! ```

pub mod primitives;
pub mod strip;
pub mod zoom;
mod types;

use image::{DynamicImage, GrayImage};

use crate::config::Settings;

// Re-export public API
pub use primitives::{apply_contrast, dither, enhance_contrast, resize_and_pad, to_grayscale};
pub use strip::LongStrip;
pub use types::{Result, TransformError};
pub use zoom::{plan_zoom_bands, split_zoom_pages, BandRange, ZoomPlan};

/// Applies the configured page derivations to source images
#[derive(Debug, Clone, Copy)]
pub struct PageTransformer {
    target_width: u32,
    target_height: u32,
    contrast: u8,
    dithering: bool,
    overlap: f32,
}

impl PageTransformer {
    /// Create a transformer for validated settings
    pub fn new(settings: &Settings) -> Self {
        Self {
            target_width: settings.target_width,
            target_height: settings.target_height,
            contrast: settings.contrast,
            dithering: settings.dithering,
            overlap: settings.overlap_fraction(),
        }
    }

    /// Same transformer with contrast disabled, for already normalized input
    #[must_use]
    pub fn without_contrast(mut self) -> Self {
        self.contrast = 0;
        self
    }

    /// Target page size
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Grayscale and contrast
    pub fn normalize(&self, img: &DynamicImage) -> GrayImage {
        apply_contrast(&to_grayscale(img), self.contrast)
    }

    /// Whole page fitted upright on the target canvas
    pub fn main_page(&self, img: &DynamicImage) -> Result<GrayImage> {
        let gray = self.normalize(img);
        resize_and_pad(&gray, self.target_width, self.target_height, self.dithering)
    }

    /// Overlapping rotated bands of one source page
    pub fn zoom_pages(&self, img: &DynamicImage) -> Result<Vec<GrayImage>> {
        let gray = self.normalize(img);
        split_zoom_pages(&gray, self.target_width, self.target_height, self.dithering)
    }

    /// Zoom bands of an already grayscale page (contrast still applies)
    pub fn zoom_gray_pages(&self, gray: &GrayImage) -> Result<Vec<GrayImage>> {
        let gray = apply_contrast(gray, self.contrast);
        split_zoom_pages(&gray, self.target_width, self.target_height, self.dithering)
    }

    /// Reflow all images of a chapter as one long strip
    pub fn strip_pages(&self, images: &[DynamicImage]) -> Result<Vec<GrayImage>> {
        let normalized: Vec<GrayImage> = images.iter().map(|img| self.normalize(img)).collect();
        let strip = LongStrip::new(&normalized, self.target_width)?;
        tracing::debug!(
            "Long strip: {} images, {} px tall",
            images.len(),
            strip.total_height()
        );
        strip.pages(self.target_height, self.overlap, self.dithering)
    }
}
