//! Progress reporting for batch conversion.
//!
//! Batches report through a stream of [`ProgressEvent`]s; the CLI drives an
//! `indicatif` bar from them.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;

/// Outcome of one conversion unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingStage {
    /// Unit converted
    Completed,
    /// Unit failed; the batch continues
    Failed,
}

impl ProcessingStage {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessingStage::Completed => "Completed",
            ProcessingStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// No progress output
    Quiet,
    #[default]
    Normal,
    /// Per-unit messages
    Verbose,
}

impl OutputMode {
    /// Mode from `-v` count and `-q`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => OutputMode::Quiet,
            (false, 0) => OutputMode::Normal,
            _ => OutputMode::Verbose,
        }
    }
}

/// One progress step of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// 1-based position of the unit
    pub current: usize,
    pub total: usize,
    /// Source file name of the unit
    pub item: String,
    pub stage: ProcessingStage,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        current: usize,
        total: usize,
        item: impl Into<String>,
        stage: ProcessingStage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            current,
            total,
            item: item.into(),
            stage,
            message: message.into(),
        }
    }

    /// Completion in percent, 0-100
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.current.min(self.total) * 100) / self.total) as u8
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} {}: {}",
            self.current, self.total, self.stage, self.item, self.message
        )
    }
}

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar for `total` units; hidden in quiet mode
pub fn build_progress_bar(total: u64, mode: OutputMode) -> ProgressBar {
    if mode == OutputMode::Quiet {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(total);
    bar.set_style(style);
    bar
}

/// Advance a bar to match an event
pub fn apply_event(bar: &ProgressBar, event: &ProgressEvent, mode: OutputMode) {
    bar.set_position(event.current as u64);
    bar.set_message(event.item.clone());
    if mode == OutputMode::Verbose {
        bar.println(event.to_string());
    }
}
