//! Command-line integration tests

use assert_cmd::Command;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use predicates::prelude::*;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

fn write_cbz(path: &Path, pages: usize) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for i in 0..pages {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::from_pixel(48, 80, Luma([255])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        zip.start_file(format!("{:03}.png", i + 1), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(buf.get_ref()).unwrap();
    }
    zip.finish().unwrap();
}

fn cmd() -> Command {
    Command::cargo_bin("xtc-convert").unwrap()
}

// CLI-101: info prints version
#[test]
fn test_info() {
    cmd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// CLI-102: missing input maps to exit code 3
#[test]
fn test_convert_missing_input() {
    cmd()
        .args(["convert", "/nonexistent/input/dir"])
        .assert()
        .code(3);
}

// CLI-103: unrecognized archive needs review
#[test]
fn test_convert_needs_review() {
    let dir = tempfile::tempdir().unwrap();
    write_cbz(&dir.path().join("Chapter 1.cbz"), 1);
    write_cbz(&dir.path().join("extras.cbz"), 1);

    cmd()
        .arg("convert")
        .arg(dir.path())
        .arg("-o")
        .arg(dir.path().join("out"))
        .assert()
        .code(5)
        .stderr(predicate::str::contains("extras.cbz"));
}

// CLI-104: end-to-end conversion writes the output tree
#[test]
fn test_convert_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Series");
    std::fs::create_dir_all(&input).unwrap();
    write_cbz(&input.join("Series ch 1.cbz"), 2);
    write_cbz(&input.join("Series ch 2.cbz"), 1);
    write_cbz(&input.join("bonus.cbz"), 1);
    let out = dir.path().join("out");

    cmd()
        .arg("convert")
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .args(["--width", "48", "--height", "80", "--no-dither", "-q"])
        .arg("--assign")
        .arg(format!("9={}", input.join("bonus.cbz").display()))
        .assert()
        .success();

    assert!(out.join("Series/0001/main_0001.xtc").is_file());
    assert!(out.join("Series/0001/zoom_0001/0001_2.xtc").is_file());
    assert!(out.join("Series/0002/main_0002.xtc").is_file());
    assert!(out.join("Series/0009/main_0009.xtc").is_file());

    cmd()
        .arg("inspect")
        .arg(out.join("Series/0001/main_0001.xtc"))
        .arg("--verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pages:      2"));
}

// CLI-105: classify as JSON
#[test]
fn test_classify_json() {
    let dir = tempfile::tempdir().unwrap();
    write_cbz(&dir.path().join("Vol 2 Chapter 14.cbz"), 1);

    cmd()
        .arg("classify")
        .arg(dir.path())
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"14\""));
}

// CLI-106: dry run leaves no output
#[test]
fn test_convert_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("chapter 3.cbz");
    write_cbz(&cbz, 1);
    let out = dir.path().join("out");

    cmd()
        .arg("convert")
        .arg(&cbz)
        .arg("-o")
        .arg(&out)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry Run"));
    assert!(!out.exists());
}

// CLI-107: preview writes a JPEG
#[test]
fn test_preview() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("ch1.cbz");
    write_cbz(&cbz, 1);
    let jpg = dir.path().join("cover.jpg");

    cmd()
        .arg("preview")
        .arg(&cbz)
        .arg("-o")
        .arg(&jpg)
        .assert()
        .success();

    let bytes = std::fs::read(&jpg).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

// CLI-108: archive skip warnings are logged for every command
#[test]
fn test_preview_logs_skipped_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cbz = dir.path().join("ch1.cbz");
    let file = std::fs::File::create(&cbz).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("001.png", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"not a png").unwrap();
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    zip.start_file("002.png", SimpleFileOptions::default()).unwrap();
    zip.write_all(buf.get_ref()).unwrap();
    zip.finish().unwrap();

    cmd()
        .arg("preview")
        .arg(&cbz)
        .arg("-o")
        .arg(dir.path().join("p.jpg"))
        .assert()
        .success()
        .stderr(predicate::str::contains("Skipping 001.png"));
}
