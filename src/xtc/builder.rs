//! XTC container assembly
//!
//! Layout: header, optional metadata block, optional chapter table, index
//! table, then the page blobs back to back. Offsets in the index are
//! absolute.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{
    validate_chapters, ChapterRecord, IndexEntry, ReadDirection, Result, XtcError, XtcHeader,
    XtcMetadata, BASIC_HEADER_SIZE, CHAPTER_RECORD_SIZE, EXTENDED_HEADER_SIZE, INDEX_ENTRY_SIZE,
    MAX_PAGES, METADATA_SIZE, VERSION_BASIC, VERSION_EXTENDED,
};
use super::xtg::XtgBlob;

/// A container written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenContainer {
    pub path: PathBuf,
    /// File size in bytes
    pub bytes: u64,
    pub pages: usize,
}

/// Collects page blobs and lays out an XTC container
#[derive(Debug, Clone)]
pub struct XtcBuilder {
    width: u16,
    height: u16,
    pages: Vec<XtgBlob>,
    metadata: Option<XtcMetadata>,
    chapters: Vec<ChapterRecord>,
    read_direction: ReadDirection,
    current_page: u32,
}

impl XtcBuilder {
    /// Builder for pages of exactly `width x height`
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pages: Vec::new(),
            metadata: None,
            chapters: Vec::new(),
            read_direction: ReadDirection::default(),
            current_page: 0,
        }
    }

    /// Attach a metadata block (switches to the extended header)
    #[must_use]
    pub fn with_metadata(mut self, metadata: XtcMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a chapter table; checked against the page count on output
    #[must_use]
    pub fn with_chapters(mut self, chapters: Vec<ChapterRecord>) -> Self {
        self.chapters = chapters;
        self
    }

    #[must_use]
    pub fn read_direction(mut self, direction: ReadDirection) -> Self {
        self.read_direction = direction;
        self
    }

    /// Page the reader opens at
    #[must_use]
    pub fn current_page(mut self, page: u32) -> Self {
        self.current_page = page;
        self
    }

    /// Append a page; its size must match the container
    pub fn push_page(&mut self, blob: XtgBlob) -> Result<()> {
        if (blob.width(), blob.height()) != (self.width, self.height) {
            return Err(XtcError::DimensionMismatch {
                expected_w: self.width,
                expected_h: self.height,
                found_w: blob.width(),
                found_h: blob.height(),
            });
        }
        if self.pages.len() >= MAX_PAGES {
            return Err(XtcError::TooManyPages(self.pages.len() + 1));
        }
        self.pages.push(blob);
        Ok(())
    }

    /// Append several pages in order
    pub fn extend_pages<I: IntoIterator<Item = XtgBlob>>(&mut self, blobs: I) -> Result<()> {
        for blob in blobs {
            self.push_page(blob)?;
        }
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Header fields for the current contents
    fn header(&self) -> XtcHeader {
        let has_chapters = !self.chapters.is_empty();
        let has_metadata = self.metadata.is_some() || has_chapters;
        let extended = has_metadata || has_chapters;

        let (metadata_offset, chapter_offset, mut cursor) = if extended {
            let meta = EXTENDED_HEADER_SIZE as u64;
            let chapters = meta + METADATA_SIZE as u64;
            (meta, Some(chapters), chapters)
        } else {
            (0, None, BASIC_HEADER_SIZE as u64)
        };
        cursor += (self.chapters.len() * CHAPTER_RECORD_SIZE) as u64;
        let index_offset = cursor;
        let data_offset = index_offset + (self.pages.len() * INDEX_ENTRY_SIZE) as u64;

        XtcHeader {
            version: if extended {
                VERSION_EXTENDED
            } else {
                VERSION_BASIC
            },
            page_count: self.pages.len() as u16,
            read_direction: self.read_direction,
            has_metadata,
            has_thumbnails: false,
            has_chapters,
            current_page: self.current_page,
            metadata_offset,
            index_offset,
            data_offset,
            thumb_offset: 0,
            chapter_offset,
        }
    }

    /// Serialize the whole container
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.pages.is_empty() {
            return Err(XtcError::NoPages);
        }
        validate_chapters(&self.chapters, self.pages.len())?;

        let header = self.header();
        let payload: usize = self.pages.iter().map(XtgBlob::len).sum();
        let mut out = Vec::with_capacity(header.data_offset as usize + payload);

        header.write(&mut out)?;

        if header.has_metadata {
            let mut metadata = self.metadata.clone().unwrap_or_default();
            metadata.chapter_count = self.chapters.len() as u16;
            out.write_all(&metadata.encode())?;
        }
        for chapter in &self.chapters {
            out.write_all(&chapter.encode())?;
        }

        let mut offset = header.data_offset;
        for blob in &self.pages {
            let entry = IndexEntry {
                offset,
                length: blob.len() as u32,
                width: blob.width(),
                height: blob.height(),
            };
            entry.write(&mut out)?;
            offset = entry.end();
        }

        debug_assert_eq!(out.len() as u64, header.data_offset);
        for blob in &self.pages {
            out.write_all(blob.as_bytes())?;
        }
        Ok(out)
    }

    /// Write atomically: temp file in the target directory, then rename
    pub fn write_to(&self, path: &Path) -> Result<WrittenContainer> {
        let bytes = self.to_bytes()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| XtcError::IoError(e.error))?;

        tracing::debug!(
            "Wrote {} ({} pages, {} bytes)",
            path.display(),
            self.pages.len(),
            bytes.len()
        );

        Ok(WrittenContainer {
            path: path.to_path_buf(),
            bytes: bytes.len() as u64,
            pages: self.pages.len(),
        })
    }
}
