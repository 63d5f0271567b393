//! XTC/XTG format types and fixed-layout records
//!
//! All multi-byte fields are little-endian.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::io::{Cursor, Write};
use thiserror::Error;

// ============================================================
// Constants
// ============================================================

/// Container magic
pub const XTC_MAGIC: [u8; 4] = *b"XTC\0";

/// Page blob magic
pub const XTG_MAGIC: [u8; 4] = *b"XTG\0";

/// Size of the XTG page header
pub const XTG_HEADER_SIZE: usize = 22;

/// Size of the basic container header
pub const BASIC_HEADER_SIZE: usize = 48;

/// Size of the extended container header (adds chapterOffset)
pub const EXTENDED_HEADER_SIZE: usize = 56;

/// Version written with the basic header
pub const VERSION_BASIC: u16 = 1;

/// Version written with the extended header
pub const VERSION_EXTENDED: u16 = 0x0100;

/// Size of the metadata block
pub const METADATA_SIZE: usize = 256;

/// Size of one chapter record
pub const CHAPTER_RECORD_SIZE: usize = 96;

/// Size of one index entry
pub const INDEX_ENTRY_SIZE: usize = 16;

/// Bytes of MD5 kept as the page digest
pub const DIGEST_LEN: usize = 8;

/// Most pages a container can address
pub const MAX_PAGES: usize = u16::MAX as usize;

const TITLE_FIELD: (usize, usize) = (0x00, 128);
const AUTHOR_FIELD: (usize, usize) = (0x80, 64);
const GENERATOR_FIELD: (usize, usize) = (0xC0, 32);
const LANGUAGE_FIELD: (usize, usize) = (0xE0, 16);
const TIMESTAMP_OFFSET: usize = 0xF0;
const COVER_OFFSET: usize = 0xF4;
const CHAPTER_COUNT_OFFSET: usize = 0xF6;

const CHAPTER_NAME_LEN: usize = 80;
const CHAPTER_START_OFFSET: usize = 0x50;
const CHAPTER_END_OFFSET: usize = 0x52;

/// Generator tag written into metadata blocks
pub const GENERATOR: &str = concat!("xtc-convert ", env!("CARGO_PKG_VERSION"));

// ============================================================
// Error Types
// ============================================================

/// XTC/XTG format error types
#[derive(Debug, Error)]
pub enum XtcError {
    #[error("Bad {what} magic: {found:02x?}")]
    BadMagic { what: &'static str, found: [u8; 4] },

    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{what} out of bounds: offset {offset} + length {length} exceeds {limit}")]
    OutOfBounds {
        what: String,
        offset: u64,
        length: u64,
        limit: u64,
    },

    #[error("Payload size mismatch: header says {declared}, expected {expected}")]
    PayloadSize { declared: usize, expected: usize },

    #[error("Page digest mismatch: stored {stored:02x?}, computed {computed:02x?}")]
    DigestMismatch {
        stored: [u8; DIGEST_LEN],
        computed: [u8; DIGEST_LEN],
    },

    #[error("Page size {found_w}x{found_h} does not match container size {expected_w}x{expected_h}")]
    DimensionMismatch {
        expected_w: u16,
        expected_h: u16,
        found_w: u16,
        found_h: u16,
    },

    #[error("Page size {width}x{height} outside 1..=65535")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Too many pages: {0} (max {max})", max = MAX_PAGES)]
    TooManyPages(usize),

    #[error("Container has no pages")]
    NoPages,

    #[error("Invalid chapters: {0}")]
    InvalidChapters(String),

    #[error("Chapter table present without a metadata block")]
    ChaptersWithoutMetadata,

    #[error("Invalid read direction: {0}")]
    InvalidReadDirection(u8),

    #[error("Unsupported version 0x{0:04x}")]
    UnsupportedVersion(u16),

    #[error("Unsupported page encoding: color mode {color_mode}, compression {compression}")]
    UnsupportedEncoding { color_mode: u8, compression: u8 },

    #[error("Page index {index} out of range (page count {count})")]
    PageIndex { index: usize, count: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, XtcError>;

/// Fail with `Truncated` unless `data` holds at least `needed` bytes
pub(crate) fn ensure_len(data: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if data.len() < needed {
        return Err(XtcError::Truncated {
            what,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

/// Fail with `OutOfBounds` unless `offset + length <= limit`
pub(crate) fn ensure_in_bounds(what: impl Into<String>, offset: u64, length: u64, limit: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(XtcError::OutOfBounds {
            what: what.into(),
            offset,
            length,
            limit,
        }),
    }
}

// ============================================================
// Read Direction
// ============================================================

/// Page turn direction stored in the container header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ReadDirection {
    #[default]
    LeftToRight,
    RightToLeft,
    TopToBottom,
}

impl ReadDirection {
    /// Header byte value
    pub fn as_u8(self) -> u8 {
        match self {
            Self::LeftToRight => 0,
            Self::RightToLeft => 1,
            Self::TopToBottom => 2,
        }
    }
}

impl TryFrom<u8> for ReadDirection {
    type Error = XtcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::LeftToRight),
            1 => Ok(Self::RightToLeft),
            2 => Ok(Self::TopToBottom),
            other => Err(XtcError::InvalidReadDirection(other)),
        }
    }
}

// ============================================================
// Container Header
// ============================================================

/// Container header, basic (48 bytes) or extended (56 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XtcHeader {
    pub version: u16,
    pub page_count: u16,
    pub read_direction: ReadDirection,
    pub has_metadata: bool,
    pub has_thumbnails: bool,
    pub has_chapters: bool,
    pub current_page: u32,
    pub metadata_offset: u64,
    pub index_offset: u64,
    pub data_offset: u64,
    pub thumb_offset: u64,
    /// Present only in the extended variant
    pub chapter_offset: Option<u64>,
}

impl XtcHeader {
    /// The extended layout is used whenever metadata or chapters are present
    pub fn is_extended(&self) -> bool {
        self.has_metadata || self.has_chapters
    }

    /// Encoded header size
    pub fn size(&self) -> usize {
        if self.is_extended() {
            EXTENDED_HEADER_SIZE
        } else {
            BASIC_HEADER_SIZE
        }
    }

    /// Serialize the header
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&XTC_MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u16::<LittleEndian>(self.page_count)?;
        writer.write_u8(self.read_direction.as_u8())?;
        writer.write_u8(self.has_metadata as u8)?;
        writer.write_u8(self.has_thumbnails as u8)?;
        writer.write_u8(self.has_chapters as u8)?;
        writer.write_u32::<LittleEndian>(self.current_page)?;
        writer.write_u64::<LittleEndian>(self.metadata_offset)?;
        writer.write_u64::<LittleEndian>(self.index_offset)?;
        writer.write_u64::<LittleEndian>(self.data_offset)?;
        writer.write_u64::<LittleEndian>(self.thumb_offset)?;
        if self.is_extended() {
            writer.write_u64::<LittleEndian>(self.chapter_offset.unwrap_or(0))?;
        }
        Ok(())
    }

    /// Parse and validate the header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, BASIC_HEADER_SIZE, "container header")?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[..4]);
        if magic != XTC_MAGIC {
            return Err(XtcError::BadMagic {
                what: "XTC",
                found: magic,
            });
        }

        let mut cursor = Cursor::new(&data[4..]);
        let version = cursor.read_u16::<LittleEndian>()?;
        let page_count = cursor.read_u16::<LittleEndian>()?;
        let read_direction = ReadDirection::try_from(cursor.read_u8()?)?;
        let has_metadata = cursor.read_u8()? != 0;
        let has_thumbnails = cursor.read_u8()? != 0;
        let has_chapters = cursor.read_u8()? != 0;
        let current_page = cursor.read_u32::<LittleEndian>()?;
        let metadata_offset = cursor.read_u64::<LittleEndian>()?;
        let index_offset = cursor.read_u64::<LittleEndian>()?;
        let data_offset = cursor.read_u64::<LittleEndian>()?;
        let thumb_offset = cursor.read_u64::<LittleEndian>()?;

        let extended = has_metadata || has_chapters;
        let expected_version = if extended {
            VERSION_EXTENDED
        } else {
            VERSION_BASIC
        };
        if version != expected_version {
            return Err(XtcError::UnsupportedVersion(version));
        }

        let chapter_offset = if extended {
            ensure_len(data, EXTENDED_HEADER_SIZE, "extended container header")?;
            Some(cursor.read_u64::<LittleEndian>()?)
        } else {
            None
        };

        Ok(Self {
            version,
            page_count,
            read_direction,
            has_metadata,
            has_thumbnails,
            has_chapters,
            current_page,
            metadata_offset,
            index_offset,
            data_offset,
            thumb_offset,
            chapter_offset,
        })
    }
}

// ============================================================
// Metadata
// ============================================================

/// Book metadata block (256 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XtcMetadata {
    pub title: String,
    pub author: String,
    pub generator: String,
    pub language: String,
    /// Unix seconds
    pub timestamp: u32,
    pub cover_page: u16,
    /// Filled in by the builder from the chapter table
    pub chapter_count: u16,
}

impl Default for XtcMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            generator: GENERATOR.to_string(),
            language: String::new(),
            timestamp: chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32,
            cover_page: 0,
            chapter_count: 0,
        }
    }
}

impl XtcMetadata {
    /// Metadata with a title, stamped now
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Encode into the fixed 256-byte block
    pub fn encode(&self) -> [u8; METADATA_SIZE] {
        let mut block = [0u8; METADATA_SIZE];
        write_fixed_str(&mut block, TITLE_FIELD, &self.title);
        write_fixed_str(&mut block, AUTHOR_FIELD, &self.author);
        write_fixed_str(&mut block, GENERATOR_FIELD, &self.generator);
        write_fixed_str(&mut block, LANGUAGE_FIELD, &self.language);
        LittleEndian::write_u32(&mut block[TIMESTAMP_OFFSET..], self.timestamp);
        LittleEndian::write_u16(&mut block[COVER_OFFSET..], self.cover_page);
        LittleEndian::write_u16(&mut block[CHAPTER_COUNT_OFFSET..], self.chapter_count);
        block
    }

    /// Decode a metadata block
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, METADATA_SIZE, "metadata block")?;
        Ok(Self {
            title: read_fixed_str(data, TITLE_FIELD),
            author: read_fixed_str(data, AUTHOR_FIELD),
            generator: read_fixed_str(data, GENERATOR_FIELD),
            language: read_fixed_str(data, LANGUAGE_FIELD),
            timestamp: LittleEndian::read_u32(&data[TIMESTAMP_OFFSET..]),
            cover_page: LittleEndian::read_u16(&data[COVER_OFFSET..]),
            chapter_count: LittleEndian::read_u16(&data[CHAPTER_COUNT_OFFSET..]),
        })
    }
}

// ============================================================
// Chapters
// ============================================================

/// Chapter record: name and inclusive page range (96 bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterRecord {
    pub name: String,
    pub start_page: u16,
    pub end_page: u16,
}

impl ChapterRecord {
    pub fn new(name: impl Into<String>, start_page: u16, end_page: u16) -> Self {
        Self {
            name: name.into(),
            start_page,
            end_page,
        }
    }

    /// Encode into a fixed 96-byte record
    pub fn encode(&self) -> [u8; CHAPTER_RECORD_SIZE] {
        let mut record = [0u8; CHAPTER_RECORD_SIZE];
        write_fixed_str(&mut record, (0, CHAPTER_NAME_LEN), &self.name);
        LittleEndian::write_u16(&mut record[CHAPTER_START_OFFSET..], self.start_page);
        LittleEndian::write_u16(&mut record[CHAPTER_END_OFFSET..], self.end_page);
        record
    }

    /// Decode one record
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, CHAPTER_RECORD_SIZE, "chapter record")?;
        Ok(Self {
            name: read_fixed_str(data, (0, CHAPTER_NAME_LEN)),
            start_page: LittleEndian::read_u16(&data[CHAPTER_START_OFFSET..]),
            end_page: LittleEndian::read_u16(&data[CHAPTER_END_OFFSET..]),
        })
    }
}

/// Check that chapters are ascending, contiguous and cover every page
pub fn validate_chapters(chapters: &[ChapterRecord], page_count: usize) -> Result<()> {
    if chapters.is_empty() {
        return Ok(());
    }

    let mut expected_start = 0usize;
    for (i, chapter) in chapters.iter().enumerate() {
        let (start, end) = (chapter.start_page as usize, chapter.end_page as usize);
        if start != expected_start {
            return Err(XtcError::InvalidChapters(format!(
                "chapter {} starts at page {}, expected {}",
                i, start, expected_start
            )));
        }
        if end < start {
            return Err(XtcError::InvalidChapters(format!(
                "chapter {} ends at page {} before it starts at {}",
                i, end, start
            )));
        }
        expected_start = end + 1;
    }

    if expected_start != page_count {
        return Err(XtcError::InvalidChapters(format!(
            "chapters cover {} pages, container has {}",
            expected_start, page_count
        )));
    }
    Ok(())
}

// ============================================================
// Index
// ============================================================

/// Index table entry (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// Absolute offset of the page blob
    pub offset: u64,
    /// Blob length including its header
    pub length: u32,
    pub width: u16,
    pub height: u16,
}

impl IndexEntry {
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.length)?;
        writer.write_u16::<LittleEndian>(self.width)?;
        writer.write_u16::<LittleEndian>(self.height)?;
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure_len(data, INDEX_ENTRY_SIZE, "index entry")?;
        Ok(Self {
            offset: LittleEndian::read_u64(&data[0..8]),
            length: LittleEndian::read_u32(&data[8..12]),
            width: LittleEndian::read_u16(&data[12..14]),
            height: LittleEndian::read_u16(&data[14..16]),
        })
    }

    /// One past the last byte of the blob
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

// ============================================================
// Fixed-width strings
// ============================================================

/// Write UTF-8 into a NUL-padded field, cut on a char boundary so at least
/// one NUL terminator remains
fn write_fixed_str(buf: &mut [u8], (offset, len): (usize, usize), value: &str) {
    let max = len - 1;
    let mut end = value.len().min(max);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    buf[offset..offset + end].copy_from_slice(&value.as_bytes()[..end]);
}

fn read_fixed_str(buf: &[u8], (offset, len): (usize, usize)) -> String {
    let field = &buf[offset..offset + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
