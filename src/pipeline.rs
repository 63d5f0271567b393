//! Chapter conversion pipeline
//!
//! Converts CBZ chapters into the per-chapter output tree:
//!
//! ```text
//! <out>/<title>/<NNNN>/main_<NNNN>.xtc
//! <out>/<title>/<NNNN>/zoom_<NNNN>/<NNNN>_<i>.xtc
//! ```
//!
//! `main` holds one page per source image (or per strip window in strip
//! mode); each zoom file holds the rotated bands of one of those pages.
//! Pages of a chapter are derived in parallel with rayon; chapters are
//! converted one at a time by [`ConversionBatch`].

use image::{DynamicImage, GrayImage};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::archive::{read_archive_images, ArchiveError, SkippedEntry};
use crate::config::Settings;
use crate::progress::{ProcessingStage, ProgressEvent};
use crate::transform::{PageTransformer, TransformError};
use crate::xtc::{encode_page, WrittenContainer, XtcBuilder, XtcError};

/// Pipeline error types
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Container error: {0}")]
    Xtc(#[from] XtcError),

    #[error("No decodable images in {0}")]
    NoImages(PathBuf),

    #[error("All {failed} chapters failed")]
    NothingConverted { failed: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Zero-padded chapter label used for directory and file names
pub fn chapter_label(chapter: u32) -> String {
    format!("{:04}", chapter)
}

/// Make a title usable as a single directory name
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Files produced for one chapter
#[derive(Debug, Clone, Serialize)]
pub struct ChapterOutput {
    pub chapter: u32,
    pub source: PathBuf,
    /// Decoded source images
    pub source_pages: usize,
    pub main: WrittenContainer,
    pub zoom: Vec<WrittenContainer>,
    pub skipped: Vec<SkippedEntry>,
}

impl ChapterOutput {
    /// Pages across the main and zoom containers
    pub fn total_pages(&self) -> usize {
        self.main.pages + self.zoom.iter().map(|z| z.pages).sum::<usize>()
    }
}

/// A chapter that could not be converted
#[derive(Debug, Clone, Serialize)]
pub struct ChapterFailure {
    pub chapter: u32,
    pub source: PathBuf,
    pub error: String,
}

/// Converts single chapters into the output tree of one title
#[derive(Debug, Clone)]
pub struct ChapterConverter {
    settings: Settings,
    transformer: PageTransformer,
    root: PathBuf,
}

impl ChapterConverter {
    /// Converter writing under `<output_dir>/<title>`
    pub fn new(settings: Settings, output_dir: &Path, title: &str) -> Self {
        Self {
            transformer: PageTransformer::new(&settings),
            root: output_dir.join(sanitize_title(title)),
            settings,
        }
    }

    /// Title directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Main and per-page zoom rasters of a chapter
    fn derive_pages(&self, images: &[DynamicImage]) -> Result<(Vec<GrayImage>, Vec<Vec<GrayImage>>)> {
        if self.settings.strip_mode {
            let main = self.transformer.strip_pages(images)?;
            let plain = self.transformer.without_contrast();
            let zoom = main
                .par_iter()
                .map(|page| plain.zoom_gray_pages(page))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok((main, zoom));
        }

        let main = images
            .par_iter()
            .map(|img| self.transformer.main_page(img))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let zoom = images
            .par_iter()
            .map(|img| self.transformer.zoom_pages(img))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((main, zoom))
    }

    /// Encode pages in parallel and write one container
    fn write_container(&self, pages: &[GrayImage], path: &Path) -> Result<WrittenContainer> {
        let (width, height) = self.settings.page_size();
        let blobs = pages
            .par_iter()
            .map(|page| {
                encode_page(
                    page,
                    self.settings.target_width,
                    self.settings.target_height,
                    self.settings.threshold,
                )
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut builder = XtcBuilder::new(width, height);
        builder.extend_pages(blobs)?;
        Ok(builder.write_to(path)?)
    }

    /// Convert one chapter archive
    pub fn convert_chapter(&self, chapter: u32, archive: &Path) -> Result<ChapterOutput> {
        let decoded = read_archive_images(archive)?;
        if decoded.is_empty() {
            return Err(ConvertError::NoImages(archive.to_path_buf()));
        }
        let skipped = decoded.skipped.clone();
        let images = decoded.into_images();
        let source_pages = images.len();

        let (main_pages, zoom_pages) = self.derive_pages(&images)?;
        drop(images);

        let label = chapter_label(chapter);
        let chapter_dir = self.root.join(&label);
        let zoom_dir = chapter_dir.join(format!("zoom_{}", label));
        std::fs::create_dir_all(&zoom_dir)?;

        let main = self.write_container(&main_pages, &chapter_dir.join(format!("main_{}.xtc", label)))?;

        let zoom = zoom_pages
            .par_iter()
            .enumerate()
            .map(|(i, bands)| {
                let path = zoom_dir.join(format!("{}_{}.xtc", label, i + 1));
                self.write_container(bands, &path)
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Chapter {}: {} source pages -> {} main pages, {} zoom files",
            chapter,
            source_pages,
            main.pages,
            zoom.len()
        );

        Ok(ChapterOutput {
            chapter,
            source: archive.to_path_buf(),
            source_pages,
            main,
            zoom,
            skipped,
        })
    }

    /// Lazy batch over `chapters` in ascending chapter order
    pub fn batch(self, chapters: &BTreeMap<u32, PathBuf>) -> ConversionBatch {
        let queue: Vec<(u32, PathBuf)> = chapters.iter().map(|(&n, p)| (n, p.clone())).collect();
        ConversionBatch {
            total: queue.len(),
            queue: queue.into_iter(),
            converter: self,
            position: 0,
            events: Vec::new(),
            outputs: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Forward-only batch; each `next()` converts one chapter.
///
/// Dropping the batch stops the conversion after the current chapter.
#[derive(Debug)]
pub struct ConversionBatch {
    converter: ChapterConverter,
    queue: std::vec::IntoIter<(u32, PathBuf)>,
    total: usize,
    position: usize,
    events: Vec<ProgressEvent>,
    outputs: Vec<ChapterOutput>,
    failures: Vec<ChapterFailure>,
}

impl ConversionBatch {
    /// Chapters in the batch
    pub fn total(&self) -> usize {
        self.total
    }

    /// Convert the remaining chapters and return the summary
    pub fn finish(mut self) -> Result<BatchSummary> {
        self.by_ref().for_each(drop);

        if self.outputs.is_empty() && !self.failures.is_empty() {
            return Err(ConvertError::NothingConverted {
                failed: self.failures.len(),
            });
        }

        Ok(BatchSummary {
            root: self.converter.root.clone(),
            settings: self.converter.settings.clone(),
            outputs: self.outputs,
            failures: self.failures,
            events: self.events,
        })
    }
}

impl Iterator for ConversionBatch {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        let (chapter, source) = self.queue.next()?;
        self.position += 1;

        let item = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let event = match self.converter.convert_chapter(chapter, &source) {
            Ok(output) => {
                let message = format!(
                    "chapter {}: {} pages, {} zoom files",
                    chapter,
                    output.main.pages,
                    output.zoom.len()
                );
                self.outputs.push(output);
                ProgressEvent::new(self.position, self.total, item, ProcessingStage::Completed, message)
            }
            Err(e) => {
                tracing::warn!("Chapter {} ({}) failed: {}", chapter, source.display(), e);
                self.failures.push(ChapterFailure {
                    chapter,
                    source,
                    error: e.to_string(),
                });
                ProgressEvent::new(
                    self.position,
                    self.total,
                    item,
                    ProcessingStage::Failed,
                    format!("chapter {}: {}", chapter, e),
                )
            }
        };

        self.events.push(event.clone());
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.queue.size_hint()
    }
}

/// Terminal result of a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Title directory
    pub root: PathBuf,
    pub settings: Settings,
    pub outputs: Vec<ChapterOutput>,
    pub failures: Vec<ChapterFailure>,
    /// Every event the batch emitted, in order
    pub events: Vec<ProgressEvent>,
}

impl BatchSummary {
    /// Replay the recorded progress
    pub fn replay(&self) -> impl Iterator<Item = &ProgressEvent> {
        self.events.iter()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Files written across all chapters
    pub fn files_written(&self) -> usize {
        self.outputs.iter().map(|o| 1 + o.zoom.len()).sum()
    }

    /// Archive entries skipped across all chapters
    pub fn skipped_entries(&self) -> usize {
        self.outputs.iter().map(|o| o.skipped.len()).sum()
    }
}
