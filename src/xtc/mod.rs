//! XTC/XTG codec
//!
//! XTG is a single 1-bit page; XTC is a container of XTG pages with an
//! index table and optional book metadata and chapter table.
//!
//! # Example
//!
//! ```rust,no_run
//! use xtc_convert::xtc::{encode_page, XtcBuilder, XtcReader};
//! use image::{GrayImage, Luma};
//! use std::path::Path;
//!
//! let page = GrayImage::from_pixel(480, 800, Luma([255]));
//! let mut builder = XtcBuilder::new(480, 800);
//! builder.push_page(encode_page(&page, 480, 800, 200).unwrap()).unwrap();
//! let written = builder.write_to(Path::new("out.xtc")).unwrap();
//!
//! let reader = XtcReader::open(&written.path).unwrap();
//! assert_eq!(reader.page_count(), 1);
//! ```

mod builder;
mod reader;
mod types;
mod xtg;

pub use builder::{WrittenContainer, XtcBuilder};
pub use reader::{ContainerInfo, XtcReader};
pub use types::{
    validate_chapters, ChapterRecord, IndexEntry, ReadDirection, Result, XtcError, XtcHeader,
    XtcMetadata, BASIC_HEADER_SIZE, CHAPTER_RECORD_SIZE, EXTENDED_HEADER_SIZE, GENERATOR,
    INDEX_ENTRY_SIZE, MAX_PAGES, METADATA_SIZE, XTG_HEADER_SIZE,
};
pub use xtg::{encode_page, pack_bits, payload_digest, stride, XtgBlob, XtgPage};
