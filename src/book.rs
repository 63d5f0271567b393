//! Book containers
//!
//! A [`PageLayoutEngine`] lays out each chapter into page rasters. The
//! render step normalizes those pages for e-ink (grayscale, contrast,
//! dithering) and records chapter page ranges. The result is written as one
//! XTC container with a metadata block and chapter table.
//!
//! HTML/CSS layout itself is not implemented here; [`StaticPages`] serves
//! pre-rendered page images, e.g. from a book manifest.

use image::{DynamicImage, GrayImage};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::BookSettings;
use crate::progress::{ProcessingStage, ProgressEvent};
use crate::transform::{dither, enhance_contrast, resize_and_pad, to_grayscale, TransformError};
use crate::xtc::{
    encode_page, ChapterRecord, WrittenContainer, XtcBuilder, XtcError, XtcMetadata, MAX_PAGES,
};

/// Page the reader opens book containers at
pub const BOOK_CURRENT_PAGE: u32 = 1;

/// Book error types
#[derive(Debug, Error)]
pub enum BookError {
    #[error("Layout failed for chapter '{chapter}': {message}")]
    Layout { chapter: String, message: String },

    #[error("No pages for chapter id '{0}'")]
    UnknownChapter(String),

    #[error("Book produced no pages")]
    NoPages,

    #[error("Too many pages: {0} (max {max})", max = MAX_PAGES)]
    TooManyPages(usize),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Container error: {0}")]
    Xtc(#[from] XtcError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BookError>;

// ============================================================
// Source & Layout
// ============================================================

/// One chapter of book content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookChapter {
    /// Stable identifier (e.g. the content document href)
    pub id: String,
    pub title: String,
    pub body_html: String,
}

/// Parsed book handed to a layout engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSource {
    pub title: String,
    pub author: String,
    pub language: String,
    /// Stylesheet shared by all chapters
    pub css: String,
    pub chapters: Vec<BookChapter>,
}

impl BookSource {
    fn metadata(&self) -> XtcMetadata {
        XtcMetadata::new(self.title.clone())
            .author(self.author.clone())
            .language(self.language.clone())
    }
}

/// Lays out chapter content into page rasters
pub trait PageLayoutEngine: Sync {
    /// Render `chapter` into pages of `width x height`
    fn render_chapter(
        &self,
        chapter: &BookChapter,
        css: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<DynamicImage>>;
}

/// Engine serving pre-rendered page images keyed by chapter id
#[derive(Debug, Clone, Default)]
pub struct StaticPages {
    pages: HashMap<String, Vec<PathBuf>>,
}

impl StaticPages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register page image files for a chapter id
    pub fn insert(&mut self, chapter_id: impl Into<String>, pages: Vec<PathBuf>) {
        self.pages.insert(chapter_id.into(), pages);
    }
}

impl PageLayoutEngine for StaticPages {
    fn render_chapter(
        &self,
        chapter: &BookChapter,
        _css: &str,
        _width: u32,
        _height: u32,
    ) -> Result<Vec<DynamicImage>> {
        let paths = self
            .pages
            .get(&chapter.id)
            .ok_or_else(|| BookError::UnknownChapter(chapter.id.clone()))?;
        paths
            .iter()
            .map(|p| image::open(p).map_err(BookError::from))
            .collect()
    }
}

// ============================================================
// Manifest
// ============================================================

/// Book described by a TOML manifest of pre-rendered pages
///
/// ```toml
/// title = "A Book"
/// author = "Someone"
/// language = "en"
///
/// [[chapters]]
/// title = "One"
/// pages = ["pages/001.png", "pages/002.png"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BookManifest {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub chapters: Vec<ManifestChapter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestChapter {
    pub title: String,
    #[serde(default)]
    pub pages: Vec<PathBuf>,
}

impl BookManifest {
    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BookError::Manifest(e.to_string()))
    }

    /// Book source plus an engine serving the listed pages.
    ///
    /// Relative page paths resolve against `base_dir`.
    pub fn into_parts(self, base_dir: &Path) -> (BookSource, StaticPages) {
        let mut engine = StaticPages::new();
        let chapters = self
            .chapters
            .into_iter()
            .enumerate()
            .map(|(i, ch)| {
                let id = format!("chapter-{}", i + 1);
                let pages = ch.pages.into_iter().map(|p| base_dir.join(p)).collect();
                engine.insert(id.clone(), pages);
                BookChapter {
                    id,
                    title: ch.title,
                    body_html: String::new(),
                }
            })
            .collect();

        let source = BookSource {
            title: self.title,
            author: self.author,
            language: self.language,
            css: String::new(),
            chapters,
        };
        (source, engine)
    }
}

// ============================================================
// Rendering
// ============================================================

/// Normalize one laid-out page for e-ink
fn prepare_page(img: &DynamicImage, settings: &BookSettings) -> Result<GrayImage> {
    let gray = enhance_contrast(&to_grayscale(img), settings.contrast_factor);
    let mut page = if gray.dimensions() == (settings.target_width, settings.target_height) {
        gray
    } else {
        resize_and_pad(&gray, settings.target_width, settings.target_height, false)?
    };
    if settings.dithering {
        dither(&mut page);
    }
    Ok(page)
}

/// Book pages with chapter ranges, ready to encode
#[derive(Debug, Clone)]
pub struct RenderedBook {
    pub pages: Vec<GrayImage>,
    pub chapters: Vec<ChapterRecord>,
    pub metadata: XtcMetadata,
    pub events: Vec<ProgressEvent>,
}

/// Forward-only render; each `next()` lays out one chapter.
///
/// A failing chapter ends the render; [`BookRender::finish`] returns its error.
pub struct BookRender<'a, E: PageLayoutEngine + ?Sized> {
    engine: &'a E,
    source: &'a BookSource,
    settings: BookSettings,
    position: usize,
    pages: Vec<GrayImage>,
    chapters: Vec<ChapterRecord>,
    events: Vec<ProgressEvent>,
    error: Option<BookError>,
}

impl<'a, E: PageLayoutEngine + ?Sized> BookRender<'a, E> {
    pub fn new(engine: &'a E, source: &'a BookSource, settings: BookSettings) -> Self {
        Self {
            engine,
            source,
            settings,
            position: 0,
            pages: Vec::new(),
            chapters: Vec::new(),
            events: Vec::new(),
            error: None,
        }
    }

    /// Chapters in the source
    pub fn total(&self) -> usize {
        self.source.chapters.len()
    }

    fn render_one(&mut self, chapter: &BookChapter) -> Result<usize> {
        let raw = self.engine.render_chapter(
            chapter,
            &self.source.css,
            self.settings.target_width,
            self.settings.target_height,
        )?;
        let settings = &self.settings;
        let prepared = raw
            .par_iter()
            .map(|img| prepare_page(img, settings))
            .collect::<Result<Vec<_>>>()?;

        let count = prepared.len();
        if count == 0 {
            tracing::debug!("Chapter '{}' produced no pages", chapter.title);
            return Ok(0);
        }

        let start = self.pages.len();
        let end = start + count - 1;
        if end >= MAX_PAGES {
            return Err(BookError::TooManyPages(end + 1));
        }
        self.pages.extend(prepared);
        self.chapters
            .push(ChapterRecord::new(chapter.title.clone(), start as u16, end as u16));
        Ok(count)
    }

    /// Render the remaining chapters and return the book
    pub fn finish(mut self) -> Result<RenderedBook> {
        self.by_ref().for_each(drop);

        if let Some(e) = self.error {
            return Err(e);
        }
        if self.pages.is_empty() {
            return Err(BookError::NoPages);
        }

        let mut metadata = self.source.metadata();
        metadata.chapter_count = self.chapters.len() as u16;
        Ok(RenderedBook {
            pages: self.pages,
            chapters: self.chapters,
            metadata,
            events: self.events,
        })
    }
}

impl<E: PageLayoutEngine + ?Sized> Iterator for BookRender<'_, E> {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        if self.error.is_some() {
            return None;
        }
        let source = self.source;
        let chapter = source.chapters.get(self.position)?;
        self.position += 1;
        let total = source.chapters.len();

        let event = match self.render_one(chapter) {
            Ok(count) => ProgressEvent::new(
                self.position,
                total,
                chapter.title.clone(),
                ProcessingStage::Completed,
                format!("{} pages", count),
            ),
            Err(e) => {
                let event = ProgressEvent::new(
                    self.position,
                    total,
                    chapter.title.clone(),
                    ProcessingStage::Failed,
                    e.to_string(),
                );
                self.error = Some(e);
                event
            }
        };

        self.events.push(event.clone());
        Some(event)
    }
}

/// Encode a rendered book into one container with metadata and chapters
pub fn build_book_container(
    book: &RenderedBook,
    settings: &BookSettings,
    path: &Path,
) -> Result<WrittenContainer> {
    if book.pages.len() > MAX_PAGES {
        return Err(BookError::TooManyPages(book.pages.len()));
    }

    let blobs = book
        .pages
        .par_iter()
        .map(|page| {
            encode_page(
                page,
                settings.target_width,
                settings.target_height,
                settings.threshold,
            )
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut builder = XtcBuilder::new(settings.target_width as u16, settings.target_height as u16)
        .with_metadata(book.metadata.clone())
        .with_chapters(book.chapters.clone())
        .current_page(BOOK_CURRENT_PAGE);
    builder.extend_pages(blobs)?;
    let written = builder.write_to(path)?;

    tracing::info!(
        "Book written: {} ({} pages, {} chapters)",
        written.path.display(),
        written.pages,
        book.chapters.len()
    );
    Ok(written)
}
