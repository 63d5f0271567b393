//! XTC container reader
//!
//! Parses the whole structure up front and rejects any offset or length
//! that points outside the file. Page payloads are decoded on demand.

use serde::Serialize;
use std::path::Path;

use super::types::{
    ensure_in_bounds, validate_chapters, ChapterRecord, IndexEntry, Result, XtcError, XtcHeader,
    XtcMetadata, CHAPTER_RECORD_SIZE, INDEX_ENTRY_SIZE, METADATA_SIZE,
};
use super::xtg::XtgPage;

/// Summary of a parsed container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub file_size: u64,
    pub header: XtcHeader,
    pub metadata: Option<XtcMetadata>,
    pub chapters: Vec<ChapterRecord>,
    pub pages: Vec<IndexEntry>,
}

/// Validated view of an XTC file
#[derive(Debug, Clone)]
pub struct XtcReader {
    data: Vec<u8>,
    header: XtcHeader,
    metadata: Option<XtcMetadata>,
    chapters: Vec<ChapterRecord>,
    entries: Vec<IndexEntry>,
}

impl XtcReader {
    /// Read and validate a container file
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        tracing::debug!("Opened {} ({} bytes)", path.display(), data.len());
        Self::from_bytes(data)
    }

    /// Validate an in-memory container
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = XtcHeader::parse(&data)?;
        let file_len = data.len() as u64;
        let page_count = header.page_count as usize;

        let metadata = if header.has_metadata {
            ensure_in_bounds(
                "metadata block",
                header.metadata_offset,
                METADATA_SIZE as u64,
                file_len,
            )?;
            let start = header.metadata_offset as usize;
            Some(XtcMetadata::decode(&data[start..start + METADATA_SIZE])?)
        } else {
            None
        };

        let chapters = if header.has_chapters {
            let count = metadata
                .as_ref()
                .map(|m| m.chapter_count as usize)
                .ok_or(XtcError::ChaptersWithoutMetadata)?;
            let offset = header.chapter_offset.ok_or_else(|| {
                XtcError::InvalidChapters("basic header has no chapter offset".to_string())
            })?;
            ensure_in_bounds(
                "chapter table",
                offset,
                (count * CHAPTER_RECORD_SIZE) as u64,
                file_len,
            )?;
            let start = offset as usize;
            let records = data[start..start + count * CHAPTER_RECORD_SIZE]
                .chunks_exact(CHAPTER_RECORD_SIZE)
                .map(ChapterRecord::decode)
                .collect::<Result<Vec<_>>>()?;
            validate_chapters(&records, page_count)?;
            records
        } else {
            Vec::new()
        };

        ensure_in_bounds(
            "index table",
            header.index_offset,
            (page_count * INDEX_ENTRY_SIZE) as u64,
            file_len,
        )?;
        let start = header.index_offset as usize;
        let entries = data[start..start + page_count * INDEX_ENTRY_SIZE]
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(IndexEntry::decode)
            .collect::<Result<Vec<_>>>()?;

        let mut previous_end = header.data_offset;
        for (i, entry) in entries.iter().enumerate() {
            ensure_in_bounds(
                format!("page {}", i),
                entry.offset,
                entry.length as u64,
                file_len,
            )?;
            if entry.offset < previous_end {
                return Err(XtcError::OutOfBounds {
                    what: format!("page {} overlaps the previous region", i),
                    offset: entry.offset,
                    length: entry.length as u64,
                    limit: previous_end,
                });
            }
            previous_end = entry.end();
        }

        Ok(Self {
            data,
            header,
            metadata,
            chapters,
            entries,
        })
    }

    pub fn header(&self) -> &XtcHeader {
        &self.header
    }

    pub fn metadata(&self) -> Option<&XtcMetadata> {
        self.metadata.as_ref()
    }

    pub fn chapters(&self) -> &[ChapterRecord] {
        &self.chapters
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Index entries in page order
    pub fn page_entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn entry(&self, index: usize) -> Result<&IndexEntry> {
        self.entries.get(index).ok_or(XtcError::PageIndex {
            index,
            count: self.entries.len(),
        })
    }

    /// Raw XTG bytes of one page
    pub fn page_blob(&self, index: usize) -> Result<&[u8]> {
        let entry = self.entry(index)?;
        let start = entry.offset as usize;
        Ok(&self.data[start..start + entry.length as usize])
    }

    /// Decode and validate one page
    pub fn decode_page(&self, index: usize) -> Result<XtgPage> {
        let entry = *self.entry(index)?;
        let page = XtgPage::parse(self.page_blob(index)?)?;
        if (page.width, page.height) != (entry.width, entry.height) {
            return Err(XtcError::DimensionMismatch {
                expected_w: entry.width,
                expected_h: entry.height,
                found_w: page.width,
                found_h: page.height,
            });
        }
        Ok(page)
    }

    /// Decode every page, stopping at the first invalid one
    pub fn decode_all(&self) -> Result<Vec<XtgPage>> {
        (0..self.page_count()).map(|i| self.decode_page(i)).collect()
    }

    /// Structure summary for display
    pub fn info(&self) -> ContainerInfo {
        ContainerInfo {
            file_size: self.data.len() as u64,
            header: self.header.clone(),
            metadata: self.metadata.clone(),
            chapters: self.chapters.clone(),
            pages: self.entries.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xtc::builder::XtcBuilder;
    use crate::xtc::types::ReadDirection;
    use crate::xtc::xtg::encode_page;
    use byteorder::{ByteOrder, LittleEndian};
    use image::{GrayImage, Luma};

    fn container(pages: usize) -> Vec<u8> {
        let mut builder = XtcBuilder::new(16, 2);
        for i in 0..pages {
            let page = GrayImage::from_fn(16, 2, |x, _| Luma([if x as usize == i { 0 } else { 255 }]));
            builder.push_page(encode_page(&page, 16, 2, 200).unwrap()).unwrap();
        }
        builder.to_bytes().unwrap()
    }

    // XR-001: parse basic container
    #[test]
    fn test_read_basic() {
        let reader = XtcReader::from_bytes(container(3)).unwrap();

        assert_eq!(reader.page_count(), 3);
        assert!(reader.metadata().is_none());
        assert!(reader.chapters().is_empty());
        assert_eq!(reader.header().read_direction, ReadDirection::LeftToRight);

        let page = reader.decode_page(1).unwrap().to_image();
        assert_eq!(page.get_pixel(1, 0).0[0], 0);
        assert_eq!(page.get_pixel(0, 0).0[0], 255);
    }

    // XR-002: index is monotonic and non-overlapping
    #[test]
    fn test_index_monotonic() {
        let reader = XtcReader::from_bytes(container(4)).unwrap();
        for pair in reader.page_entries().windows(2) {
            assert!(pair[0].end() <= pair[1].offset);
        }
    }

    #[test]
    fn test_page_index_out_of_range() {
        let reader = XtcReader::from_bytes(container(1)).unwrap();
        assert!(matches!(
            reader.page_blob(1),
            Err(XtcError::PageIndex { index: 1, count: 1 })
        ));
    }

    // XR-003: corrupted structures
    #[test]
    fn test_truncated_file() {
        let bytes = container(2);
        let cut = bytes[..bytes.len() - 1].to_vec();
        assert!(matches!(
            XtcReader::from_bytes(cut),
            Err(XtcError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_bad_container_magic() {
        let mut bytes = container(1);
        bytes[..4].copy_from_slice(b"ABCD");
        assert!(matches!(
            XtcReader::from_bytes(bytes),
            Err(XtcError::BadMagic { what: "XTC", .. })
        ));
    }

    #[test]
    fn test_bad_page_magic() {
        let mut bytes = container(1);
        let offset = LittleEndian::read_u64(&bytes[48..]) as usize;
        bytes[offset] = b'Z';

        let reader = XtcReader::from_bytes(bytes).unwrap();
        assert!(matches!(
            reader.decode_page(0),
            Err(XtcError::BadMagic { what: "XTG", .. })
        ));
    }

    #[test]
    fn test_index_points_outside_file() {
        let mut bytes = container(1);
        LittleEndian::write_u64(&mut bytes[48..56], 1 << 40);
        assert!(matches!(
            XtcReader::from_bytes(bytes),
            Err(XtcError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut bytes = container(1);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let reader = XtcReader::from_bytes(bytes).unwrap();
        assert!(matches!(
            reader.decode_page(0),
            Err(XtcError::DigestMismatch { .. })
        ));
    }

    // XR-004: chapter flag without metadata is rejected
    #[test]
    fn test_chapters_without_metadata() {
        let page = GrayImage::from_pixel(16, 2, Luma([255]));
        let mut builder =
            XtcBuilder::new(16, 2).with_chapters(vec![ChapterRecord::new("One", 0, 0)]);
        builder.push_page(encode_page(&page, 16, 2, 200).unwrap()).unwrap();
        let mut bytes = builder.to_bytes().unwrap();
        assert!(XtcReader::from_bytes(bytes.clone()).is_ok());

        // hasMetadata flag
        bytes[9] = 0;
        assert!(matches!(
            XtcReader::from_bytes(bytes),
            Err(XtcError::ChaptersWithoutMetadata)
        ));
    }

    #[test]
    fn test_open_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.xtc");
        std::fs::write(&path, container(2)).unwrap();

        let reader = XtcReader::open(&path).unwrap();
        let info = reader.info();
        assert_eq!(info.pages.len(), 2);
        assert_eq!(info.file_size, std::fs::metadata(&path).unwrap().len());
    }
}
