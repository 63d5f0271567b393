//! Container format integration tests
//!
//! Writes containers through the public API and checks the byte layout a
//! reader device relies on.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use xtc_convert::book::BookManifest;
use xtc_convert::{
    build_book_container, encode_page, BookRender, BookSettings, ChapterRecord, ReadDirection,
    XtcBuilder, XtcError, XtcMetadata, XtcReader,
};

fn half_black(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

// RT-001: basic container layout
#[test]
fn test_basic_container_layout() {
    let blob = encode_page(&half_black(16, 4), 16, 4, 200).unwrap();
    let mut builder = XtcBuilder::new(16, 4);
    builder.push_page(blob.clone()).unwrap();
    builder.push_page(blob).unwrap();
    let bytes = builder.to_bytes().unwrap();

    assert_eq!(&bytes[0..4], b"XTC\0");
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 1);
    assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), 2);
    // Index directly after the 48 byte header
    assert_eq!(u64::from_le_bytes(bytes[24..32].try_into().unwrap()), 48);
    // Page data after two 16 byte entries
    assert_eq!(u64::from_le_bytes(bytes[32..40].try_into().unwrap()), 80);
    assert_eq!(&bytes[80..84], b"XTG\0");

    // 16 px wide: left byte black, right byte white
    let payload_start = 80 + 22;
    assert_eq!(bytes[payload_start], 0x00);
    assert_eq!(bytes[payload_start + 1], 0xFF);
}

// RT-002: metadata and chapters survive a file round trip
#[test]
fn test_extended_container_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("book.xtc");

    let mut metadata = XtcMetadata::new("Round Trip");
    metadata.author = "Tester".to_string();
    metadata.language = "en".to_string();

    let mut builder = XtcBuilder::new(8, 8)
        .with_metadata(metadata)
        .with_chapters(vec![
            ChapterRecord::new("One", 0, 1),
            ChapterRecord::new("Two", 2, 2),
        ])
        .read_direction(ReadDirection::RightToLeft)
        .current_page(1);
    for value in [0u8, 128, 255] {
        let page = GrayImage::from_pixel(8, 8, Luma([value]));
        builder.push_page(encode_page(&page, 8, 8, 200).unwrap()).unwrap();
    }
    let written = builder.write_to(&path).unwrap();
    assert_eq!(written.pages, 3);
    assert_eq!(written.bytes, std::fs::metadata(&path).unwrap().len());

    let reader = XtcReader::open(&path).unwrap();
    let header = reader.header();
    assert_eq!(header.version, 0x0100);
    assert_eq!(header.read_direction, ReadDirection::RightToLeft);
    assert_eq!(header.current_page, 1);
    assert!(header.has_metadata && header.has_chapters);

    let meta = reader.metadata().unwrap();
    assert_eq!(meta.title, "Round Trip");
    assert_eq!(meta.author, "Tester");
    assert_eq!(meta.chapter_count, 2);
    assert_eq!(reader.chapters()[1].name, "Two");

    let pages = reader.decode_all().unwrap();
    assert!(!pages[0].is_white(3, 3));
    assert!(pages[2].is_white(3, 3));
}

/// Deterministic 0/255 pattern that differs per page
fn bilevel_page(width: u32, height: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let v = (x * 7 + y * 13 + seed * 31) ^ (x * y + seed);
        if v % 3 == 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

// RT-006: every page decodes back to the exact bitmap that was written
#[test]
fn test_pages_roundtrip_bit_exact() {
    let dir = tempfile::tempdir().unwrap();

    for (width, height) in [(16u32, 4u32), (13, 7), (1, 1), (17, 9), (480, 800)] {
        let pages: Vec<GrayImage> = (0..4).map(|seed| bilevel_page(width, height, seed)).collect();

        let mut builder = XtcBuilder::new(width as u16, height as u16)
            .with_chapters(vec![ChapterRecord::new("All", 0, 3)]);
        for page in &pages {
            builder
                .push_page(encode_page(page, width, height, 200).unwrap())
                .unwrap();
        }
        let path = dir.path().join(format!("{}x{}.xtc", width, height));
        builder.write_to(&path).unwrap();

        let decoded = XtcReader::open(&path).unwrap().decode_all().unwrap();
        assert_eq!(decoded.len(), pages.len());
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(
                &decoded[i].to_image(),
                page,
                "page {} of {}x{} differs",
                i,
                width,
                height
            );
        }
    }
}

// RT-003: corrupted page payload is detected
#[test]
fn test_corrupted_payload_rejected() {
    let mut builder = XtcBuilder::new(8, 2);
    builder
        .push_page(encode_page(&GrayImage::from_pixel(8, 2, Luma([255])), 8, 2, 200).unwrap())
        .unwrap();
    let mut bytes = builder.to_bytes().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let reader = XtcReader::from_bytes(bytes).unwrap();
    assert!(matches!(
        reader.decode_page(0),
        Err(XtcError::DigestMismatch { .. })
    ));
}

// RT-004: truncated file is rejected before any page access
#[test]
fn test_truncated_container_rejected() {
    let mut builder = XtcBuilder::new(8, 8);
    builder
        .push_page(encode_page(&half_black(8, 8), 8, 8, 200).unwrap())
        .unwrap();
    let bytes = builder.to_bytes().unwrap();

    let truncated = bytes[..bytes.len() - 4].to_vec();
    assert!(XtcReader::from_bytes(truncated).is_err());
    assert!(XtcReader::from_bytes(bytes[..20].to_vec()).is_err());
}

// RT-005: manifest driven book with chapter ranges
#[test]
fn test_book_from_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let pages_dir = dir.path().join("pages");
    std::fs::create_dir_all(&pages_dir).unwrap();
    for name in ["1.png", "2.png", "3.png"] {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(60, 100, Luma([255])))
            .save_with_format(pages_dir.join(name), ImageFormat::Png)
            .unwrap();
    }
    let manifest_path = dir.path().join("book.toml");
    std::fs::write(
        &manifest_path,
        r#"
title = "Manifest Book"
author = "Someone"
language = "en"

[[chapters]]
title = "Opening"
pages = ["pages/1.png", "pages/2.png"]

[[chapters]]
title = "Closing"
pages = ["pages/3.png"]
"#,
    )
    .unwrap();

    let settings = BookSettings {
        target_width: 120,
        target_height: 200,
        dithering: false,
        ..BookSettings::default()
    };
    let (source, engine) = BookManifest::load(&manifest_path)
        .unwrap()
        .into_parts(dir.path());
    let book = BookRender::new(&engine, &source, settings.clone())
        .finish()
        .unwrap();
    assert_eq!(book.pages.len(), 3);

    let out = dir.path().join("book.xtc");
    build_book_container(&book, &settings, &out).unwrap();

    let reader = XtcReader::open(&out).unwrap();
    assert_eq!(reader.page_count(), 3);
    assert_eq!(reader.header().current_page, 1);
    let chapters = reader.chapters();
    assert_eq!(chapters.len(), 2);
    assert_eq!((chapters[0].start_page, chapters[0].end_page), (0, 1));
    assert_eq!((chapters[1].start_page, chapters[1].end_page), (2, 2));
    assert_eq!(reader.metadata().unwrap().title, "Manifest Book");
}
