//! Drop-folder conversion client
//!
//! Hands a file to an external converter watching a shared directory:
//! the input is copied to `<root>/input/`, and `<root>/output/<stem>.<ext>`
//! is polled until it appears non-empty or the timeout elapses. The input
//! copy is removed on every path.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default overall timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Drop-folder error types
#[derive(Debug, Error)]
pub enum DropFolderError {
    #[error("Input not found: {0}")]
    NotFound(PathBuf),

    #[error("Input has no file name: {0}")]
    InvalidInput(PathBuf),

    #[error("Converter did not produce {expected} within {waited:?}")]
    Timeout { expected: PathBuf, waited: Duration },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DropFolderError>;

/// Drop-folder location and polling policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropFolderOptions {
    /// Shared directory holding `input/` and `output/`
    pub root: PathBuf,
    /// Extension of the converted file, without the dot
    pub output_extension: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl DropFolderOptions {
    /// PDF to EPUB conversion under `root` with default polling
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_extension: "epub".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into();
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }
}

/// Removes the dropped input copy when it goes out of scope
struct InputGuard {
    path: PathBuf,
}

impl Drop for InputGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Blocking client for one drop folder
#[derive(Debug, Clone)]
pub struct DropFolderConverter {
    options: DropFolderOptions,
}

impl DropFolderConverter {
    pub fn new(options: DropFolderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DropFolderOptions {
        &self.options
    }

    /// Output path the converter is expected to produce for `input`
    pub fn expected_output(&self, input: &Path) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .ok_or_else(|| DropFolderError::InvalidInput(input.to_path_buf()))?;
        let mut name = stem.to_os_string();
        name.push(".");
        name.push(&self.options.output_extension);
        Ok(self.options.output_dir().join(name))
    }

    /// Drop `input` and wait for the converted file
    pub fn convert(&self, input: &Path) -> Result<PathBuf> {
        if !input.is_file() {
            return Err(DropFolderError::NotFound(input.to_path_buf()));
        }
        let file_name = input
            .file_name()
            .ok_or_else(|| DropFolderError::InvalidInput(input.to_path_buf()))?;
        let expected = self.expected_output(input)?;

        let input_dir = self.options.input_dir();
        std::fs::create_dir_all(&input_dir)?;
        std::fs::create_dir_all(self.options.output_dir())?;

        let dropped = input_dir.join(file_name);
        let _guard = InputGuard {
            path: dropped.clone(),
        };
        std::fs::copy(input, &dropped)?;
        tracing::info!("Dropped {} for conversion", dropped.display());

        let started = Instant::now();
        loop {
            if is_ready(&expected) {
                tracing::info!("Conversion complete: {}", expected.display());
                return Ok(expected);
            }

            let waited = started.elapsed();
            if waited >= self.options.timeout {
                return Err(DropFolderError::Timeout { expected, waited });
            }
            let remaining = self.options.timeout - waited;
            std::thread::sleep(self.options.poll_interval.min(remaining));
        }
    }
}

fn is_ready(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
