//! Chapter number classification
//!
//! Recovers an ordering key from comic archive file names such as
//! `Series Vol 2 Chapter 12.cbz` or `Series 007.cbz`.
//!
//! # Algorithm
//!
//! 1. Numbers following `chapter` / `chp` / `ch` keywords (first match wins)
//! 2. Otherwise, the last standalone number left after stripping
//!    volume/book noise (`vol 2`, `book 3`, ...)
//!
//! Decimal chapters (`12.5`) map to their integer part and are flagged so
//! that batch classification never lets them evict a whole-number chapter.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ============================================================
// Patterns
// ============================================================

/// Keyword patterns, tried in order
fn chapter_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)chapter\s*[._-]?\s*(\d+(?:\.\d+)?)").expect("valid chapter pattern"),
            Regex::new(r"(?i)chp\s*[._-]?\s*(\d+(?:\.\d+)?)").expect("valid chp pattern"),
            Regex::new(r"(?i)ch\s*[._-]?\s*(\d+(?:\.\d+)?)").expect("valid ch pattern"),
        ]
    })
}

/// Volume / book designations stripped before the fallback search
fn volume_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| {
        Regex::new(r"(?i)(?:vol(?:ume)?|book|bk)\s*[._-]?\s*\d+(?:\.\d+)?")
            .expect("valid volume pattern")
    })
}

fn number_token() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number pattern"))
}

// ============================================================
// Extraction
// ============================================================

/// Extract a chapter number from a file name.
///
/// Returns `(Some(chapter), is_decimal)` when a number was found, where
/// `is_decimal` is set if the source number had a fractional part.
/// Returns `(None, false)` for unrecognized names.
pub fn extract_chapter_number(filename: &str) -> (Option<u32>, bool) {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    for pattern in chapter_patterns() {
        if let Some(m) = pattern.captures(&stem).and_then(|caps| caps.get(1)) {
            // A keyword number that does not fit is not recognized
            return match split_number(m.as_str()) {
                Some((chapter, is_decimal)) => (Some(chapter), is_decimal),
                None => (None, false),
            };
        }
    }

    let cleaned = volume_noise().replace_all(&stem, "");
    let last = number_token()
        .find_iter(&cleaned)
        .filter(|m| is_standalone(&cleaned, m.start(), m.end()))
        .last();

    match last.and_then(|m| split_number(m.as_str())) {
        Some((chapter, is_decimal)) => (Some(chapter), is_decimal),
        None => (None, false),
    }
}

/// Split `"12"` / `"12.5"` into the integer part and a decimal flag
fn split_number(token: &str) -> Option<(u32, bool)> {
    match token.split_once('.') {
        Some((whole, _)) => whole.parse().ok().map(|n| (n, true)),
        None => token.parse().ok().map(|n| (n, false)),
    }
}

/// A numeric token is standalone when no letter or digit touches it
fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}

// ============================================================
// Batch Classification
// ============================================================

/// Result of classifying a set of archive paths
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterClassification {
    /// Chapter number to archive path
    pub recognized: BTreeMap<u32, PathBuf>,
    /// Archives that need manual chapter assignment
    pub unrecognized: Vec<PathBuf>,
}

impl ChapterClassification {
    /// True when every archive received a chapter slot (or was a dropped decimal duplicate)
    pub fn is_complete(&self) -> bool {
        self.unrecognized.is_empty()
    }
}

/// Classify archive paths into chapter slots.
///
/// Paths are processed in the given order; callers normally sort them first.
/// The first claim of a chapter number wins. A later decimal-sourced claim on
/// an occupied slot is dropped, while a later whole-number claim is moved to
/// `unrecognized` for manual resolution.
pub fn classify_paths<P: AsRef<Path>>(paths: &[P]) -> ChapterClassification {
    let mut result = ChapterClassification::default();

    for path in paths {
        let path = path.as_ref();
        let name = path.to_string_lossy();
        match extract_chapter_number(&name) {
            (None, _) => result.unrecognized.push(path.to_path_buf()),
            (Some(chapter), is_decimal) if result.recognized.contains_key(&chapter) => {
                if is_decimal {
                    tracing::debug!(
                        "Dropping decimal chapter {} duplicate: {}",
                        chapter,
                        path.display()
                    );
                } else {
                    result.unrecognized.push(path.to_path_buf());
                }
            }
            (Some(chapter), _) => {
                result.recognized.insert(chapter, path.to_path_buf());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // CH-001: keyword match
    #[test]
    fn test_chapter_keyword() {
        assert_eq!(extract_chapter_number("Chapter 12.epub"), (Some(12), false));
    }

    // CH-002: decimal chapter after volume noise
    #[test]
    fn test_decimal_chapter_with_volume() {
        assert_eq!(
            extract_chapter_number("Vol 2 Chapter 5.5.cbz"),
            (Some(5), true)
        );
    }

    // CH-003: trailing standalone number
    #[test]
    fn test_trailing_number() {
        assert_eq!(extract_chapter_number("Some Manga 007.cbz"), (Some(7), false));
    }

    // CH-004: unrecognized
    #[test]
    fn test_unrecognized() {
        assert_eq!(extract_chapter_number("cover.cbz"), (None, false));
    }

    #[test]
    fn test_keyword_variants() {
        assert_eq!(extract_chapter_number("Title_chp-3.cbz"), (Some(3), false));
        assert_eq!(extract_chapter_number("Title ch.42.cbz"), (Some(42), false));
        assert_eq!(extract_chapter_number("TITLE CH_008.cbz"), (Some(8), false));
    }

    #[test]
    fn test_keyword_priority_over_trailing_number() {
        assert_eq!(
            extract_chapter_number("Chapter 4 - Part 2.cbz"),
            (Some(4), false)
        );
    }

    #[test]
    fn test_volume_noise_stripped() {
        assert_eq!(extract_chapter_number("Series Vol.3 015.cbz"), (Some(15), false));
        assert_eq!(extract_chapter_number("Series Book 2.cbz"), (None, false));
    }

    #[test]
    fn test_embedded_numbers_ignored() {
        assert_eq!(extract_chapter_number("x264 release.cbz"), (None, false));
        assert_eq!(extract_chapter_number("Series x264 - 011.cbz"), (Some(11), false));
    }

    // CH-007: numbers glued to letters are not standalone, so `c005` is not read
    #[test]
    fn test_letter_prefixed_numbers_not_standalone() {
        assert_eq!(extract_chapter_number("Series v01 c005.cbz"), (None, false));
        assert_eq!(extract_chapter_number("Series v01 - 005.cbz"), (Some(5), false));
    }

    // CH-008: keyword number overflowing u32 is unrecognized
    #[test]
    fn test_keyword_number_overflow() {
        assert_eq!(
            extract_chapter_number("Chapter 99999999999 - 12.cbz"),
            (None, false)
        );
        assert_eq!(extract_chapter_number("Series 99999999999.cbz"), (None, false));
    }

    #[test]
    fn test_directory_components_ignored() {
        assert_eq!(
            extract_chapter_number("/mangas/Volume 9/Series 021.cbz"),
            (Some(21), false)
        );
    }

    #[test]
    fn test_trailing_decimal() {
        assert_eq!(extract_chapter_number("Series - 10.5.cbz"), (Some(10), true));
    }

    // CH-005: decimal duplicate dropped
    #[test]
    fn test_classify_decimal_duplicate_dropped() {
        let paths = vec![
            PathBuf::from("Series 001.cbz"),
            PathBuf::from("Series 002.cbz"),
            PathBuf::from("Series 002.5.cbz"),
            PathBuf::from("Series 003.cbz"),
        ];
        let result = classify_paths(&paths);

        assert_eq!(result.recognized.len(), 3);
        assert_eq!(result.recognized[&2], PathBuf::from("Series 002.cbz"));
        assert!(result.unrecognized.is_empty());
        assert!(result.is_complete());
    }

    // CH-006: whole-number duplicate demoted
    #[test]
    fn test_classify_whole_duplicate_unrecognized() {
        let paths = vec![
            PathBuf::from("Series 001.cbz"),
            PathBuf::from("Series Chapter 1.cbz"),
            PathBuf::from("Series 002.cbz"),
        ];
        let result = classify_paths(&paths);

        assert_eq!(result.recognized.len(), 2);
        assert_eq!(result.recognized[&1], PathBuf::from("Series 001.cbz"));
        assert_eq!(result.unrecognized, vec![PathBuf::from("Series Chapter 1.cbz")]);
        assert!(!result.is_complete());
    }

    #[test]
    fn test_classify_decimal_first_claims_slot() {
        let paths = vec![PathBuf::from("Series 4.5.cbz"), PathBuf::from("Series 4.cbz")];
        let result = classify_paths(&paths);

        assert_eq!(result.recognized[&4], PathBuf::from("Series 4.5.cbz"));
        assert_eq!(result.unrecognized, vec![PathBuf::from("Series 4.cbz")]);
    }

    #[test]
    fn test_classify_unparseable() {
        let paths = vec![PathBuf::from("cover.cbz"), PathBuf::from("extras.cbz")];
        let result = classify_paths(&paths);
        assert!(result.recognized.is_empty());
        assert_eq!(result.unrecognized.len(), 2);
    }
}
