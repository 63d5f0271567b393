//! xtc-convert - Comic archive and e-book converter for XTC/XTG e-ink readers
//!
//! Turns CBZ comic archives and pre-rendered book pages into the fixed-size,
//! 1-bit paged-image container read by small e-ink devices.
//!
//! # Features
//!
//! - **XTC/XTG codec** ([`xtc`]) - page encoder, container builder and reader
//! - **Page derivation** ([`transform`]) - full-page fit, zoom bands, long-strip reflow
//! - **Chapter ordering** ([`chapter`]) - chapter numbers from archive file names
//! - **Chapter pipeline** ([`pipeline`]) - CBZ to XTC output tree with progress events
//! - **Book containers** ([`book`]) - paged books with metadata and chapter tables
//!
//! # Example
//!
//! ```rust,no_run
//! use xtc_convert::{encode_page, Settings, XtcBuilder, XtcReader};
//! use image::GrayImage;
//!
//! let settings = Settings::default();
//! let page = GrayImage::from_pixel(settings.target_width, settings.target_height, image::Luma([255]));
//!
//! let blob = encode_page(&page, settings.target_width, settings.target_height, settings.threshold).unwrap();
//! let mut builder = XtcBuilder::new(settings.target_width as u16, settings.target_height as u16);
//! builder.push_page(blob).unwrap();
//!
//! let bytes = builder.to_bytes().unwrap();
//! let reader = XtcReader::from_bytes(bytes).unwrap();
//! assert_eq!(reader.page_count(), 1);
//! ```

pub mod archive;
pub mod book;
pub mod chapter;
pub mod cli;
pub mod config;
pub mod dropfolder;
pub mod pipeline;
pub mod progress;
pub mod transform;
pub mod xtc;

// Re-exports for convenience
pub use archive::{first_page_preview, read_archive_images, ArchiveError, ArchiveImages, SkippedEntry};
pub use book::{
    build_book_container, BookChapter, BookError, BookRender, BookSource, PageLayoutEngine,
    RenderedBook, StaticPages,
};
pub use chapter::{classify_paths, extract_chapter_number, ChapterClassification};
pub use cli::{BookArgs, ClassifyArgs, Cli, Commands, ConvertArgs, InspectArgs, PreviewArgs};
pub use config::{BookSettings, Config, ConfigError, Settings, SettingsBuilder, SettingsOverrides};
pub use dropfolder::{DropFolderConverter, DropFolderError, DropFolderOptions};
pub use pipeline::{BatchSummary, ChapterConverter, ChapterOutput, ConversionBatch, ConvertError};
pub use progress::{build_progress_bar, ProcessingStage, ProgressEvent};
pub use transform::{
    plan_zoom_bands, BandRange, LongStrip, PageTransformer, TransformError, ZoomPlan,
};
pub use xtc::{
    encode_page, ChapterRecord, IndexEntry, ReadDirection, WrittenContainer, XtcBuilder, XtcError,
    XtcHeader, XtcMetadata, XtcReader, XtgBlob, XtgPage,
};

/// Exit codes for CLI
pub mod exit_codes {
    /// Successful completion
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Invalid command line arguments or settings
    pub const INVALID_ARGS: i32 = 2;
    /// Input file or directory not found
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// Output could not be written
    pub const OUTPUT_ERROR: i32 = 4;
    /// Some archives need manual chapter assignment
    pub const NEEDS_REVIEW: i32 = 5;
}
