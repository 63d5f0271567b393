//! Comic archive (CBZ/ZIP) input
//!
//! Image entries are read in lexicographic name order. Entries that fail to
//! decode are skipped with a warning and reported in [`ArchiveImages::skipped`].

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

/// Accepted image extensions (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Default preview bounds
pub const PREVIEW_MAX_WIDTH: u32 = 300;
pub const PREVIEW_MAX_HEIGHT: u32 = 500;

/// JPEG quality of previews
pub const PREVIEW_QUALITY: u8 = 80;

/// Upper bound on the buffer preallocated from an entry's declared size
pub const MAX_ENTRY_PREALLOC: u64 = 64 << 20;

/// Archive error types
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// An entry that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: String,
}

/// Decoded images of one archive, in name order
#[derive(Debug, Default)]
pub struct ArchiveImages {
    pub images: Vec<(String, DynamicImage)>,
    pub skipped: Vec<SkippedEntry>,
}

impl ArchiveImages {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Drop the entry names
    pub fn into_images(self) -> Vec<DynamicImage> {
        self.images.into_iter().map(|(_, img)| img).collect()
    }
}

/// Whether an entry name is a page image
pub fn is_image_entry(name: &str) -> bool {
    if name.ends_with('/') {
        return false;
    }
    let path = Path::new(name);
    let hidden = path.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy();
            part.starts_with('.') || part.to_ascii_lowercase().starts_with("__macosx")
        }
        Component::CurDir | Component::RootDir => false,
        Component::ParentDir | Component::Prefix(_) => true,
    });
    if hidden {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    if !path.exists() {
        return Err(ArchiveError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    Ok(ZipArchive::new(BufReader::new(file))?)
}

/// Page image entry names, sorted
fn image_entry_names<R: Read + std::io::Seek>(archive: &ZipArchive<R>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| is_image_entry(name))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Read buffer capacity for an entry; the declared size is untrusted
fn prealloc_hint(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_ENTRY_PREALLOC)).unwrap_or(0)
}

fn decode_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> std::result::Result<DynamicImage, String> {
    let mut entry = archive.by_name(name).map_err(|e| e.to_string())?;
    if entry.is_dir() {
        return Err("directory entry".to_string());
    }
    let mut data = Vec::with_capacity(prealloc_hint(entry.size()));
    entry.read_to_end(&mut data).map_err(|e| e.to_string())?;
    image::load_from_memory(&data).map_err(|e| e.to_string())
}

/// Decode every page image of a CBZ/ZIP archive
pub fn read_archive_images(path: &Path) -> Result<ArchiveImages> {
    let mut archive = open_archive(path)?;
    let names = image_entry_names(&archive);

    let mut result = ArchiveImages::default();
    for name in names {
        match decode_entry(&mut archive, &name) {
            Ok(img) => result.images.push((name, img)),
            Err(reason) => {
                tracing::warn!("Skipping {} in {}: {}", name, path.display(), reason);
                result.skipped.push(SkippedEntry { name, reason });
            }
        }
    }

    tracing::debug!(
        "{}: {} images, {} skipped",
        path.display(),
        result.images.len(),
        result.skipped.len()
    );
    Ok(result)
}

/// First decodable page, shrunk to fit `max_w x max_h`, as JPEG bytes.
///
/// Returns `None` when the archive has no decodable page.
pub fn first_page_preview(path: &Path, max_w: u32, max_h: u32) -> Result<Option<Vec<u8>>> {
    let mut archive = open_archive(path)?;

    for name in image_entry_names(&archive) {
        let img = match decode_entry(&mut archive, &name) {
            Ok(img) => img,
            Err(reason) => {
                tracing::warn!("Skipping {} in {}: {}", name, path.display(), reason);
                continue;
            }
        };

        // Never enlarge
        let thumb = if img.width() > max_w || img.height() > max_h {
            img.resize(max_w, max_h, FilterType::Lanczos3)
        } else {
            img
        };

        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, PREVIEW_QUALITY);
        DynamicImage::ImageRgb8(thumb.to_rgb8()).write_with_encoder(encoder)?;
        return Ok(Some(buf));
    }

    Ok(None)
}
