//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{BookSettings, SettingsOverrides};

/// Comic archive and e-book converter for XTC/XTG e-ink readers
#[derive(Parser, Debug)]
#[command(name = "xtc-convert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert CBZ chapters into main and zoom XTC containers
    Convert(ConvertArgs),
    /// Show how archive file names map to chapter numbers
    Classify(ClassifyArgs),
    /// Inspect and verify an XTC container
    Inspect(InspectArgs),
    /// Build a book container from a manifest of rendered pages
    Book(BookArgs),
    /// Write a JPEG preview of an archive's first page
    Preview(PreviewArgs),
    /// Show version, system and config information
    Info,
}

impl Commands {
    /// Verbosity flags of the selected command
    pub fn output_flags(&self) -> OutputFlags {
        match self {
            Commands::Convert(args) => args.output_flags.clone(),
            Commands::Classify(args) => args.output_flags.clone(),
            Commands::Inspect(args) => args.output_flags.clone(),
            Commands::Book(args) => args.output_flags.clone(),
            Commands::Preview(args) => args.output_flags.clone(),
            Commands::Info => OutputFlags::default(),
        }
    }
}

/// Parse a `CHAPTER=PATH` assignment
fn parse_assignment(s: &str) -> Result<(u32, PathBuf), String> {
    let (num, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CHAPTER=PATH, got '{}'", s))?;
    let num = num
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid chapter number '{}': {}", num, e))?;
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    Ok((num, PathBuf::from(path)))
}

/// Verbosity flags shared by all commands
#[derive(Args, Debug, Clone, Default)]
pub struct OutputFlags {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// CBZ file or directory of CBZ files
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    pub output: PathBuf,

    /// Title directory name (default: input directory or file name)
    #[arg(short, long)]
    pub title: Option<String>,

    /// Page width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Page height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Contrast level 0-8 (0 disables, values are clamped)
    #[arg(short, long, allow_negative_numbers = true)]
    pub contrast: Option<i64>,

    /// Disable Floyd-Steinberg dithering
    #[arg(long)]
    pub no_dither: bool,

    /// Reflow each chapter as one continuous strip
    #[arg(long)]
    pub strip: bool,

    /// Strip window overlap in percent (0-50)
    #[arg(long)]
    pub overlap: Option<f32>,

    /// Binarization threshold 0-255
    #[arg(long)]
    pub threshold: Option<u8>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Config file (default: ./xtc-convert.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Assign a chapter number to an archive by hand (CHAPTER=PATH)
    #[arg(long = "assign", value_parser = parse_assignment)]
    pub assignments: Vec<(u32, PathBuf)>,

    /// Convert recognized chapters even if some archives are unrecognized
    #[arg(long)]
    pub skip_unrecognized: bool,

    /// Show the plan without converting
    #[arg(long)]
    pub dry_run: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub output_flags: OutputFlags,
}

impl ConvertArgs {
    /// Settings given on the command line
    pub fn to_overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            target_width: self.width,
            target_height: self.height,
            contrast: self.contrast,
            dithering: self.no_dither.then_some(false),
            overlap_percent: self.overlap,
            strip_mode: self.strip.then_some(true),
            threshold: self.threshold,
            threads: self.threads,
        }
    }
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// CBZ files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub output_flags: OutputFlags,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// XTC file
    pub file: PathBuf,

    /// Decode every page and check digests
    #[arg(long)]
    pub verify: bool,

    /// Write each page as PNG into this directory
    #[arg(long)]
    pub extract: Option<PathBuf>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub output_flags: OutputFlags,
}

#[derive(Args, Debug)]
pub struct BookArgs {
    /// Book manifest (TOML)
    pub manifest: PathBuf,

    /// Output XTC file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Page width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Page height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Contrast factor (1.0 = unchanged)
    #[arg(long)]
    pub contrast_factor: Option<f32>,

    /// Disable Floyd-Steinberg dithering
    #[arg(long)]
    pub no_dither: bool,

    /// Binarization threshold 0-255
    #[arg(long)]
    pub threshold: Option<u8>,

    /// Config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub output_flags: OutputFlags,
}

impl BookArgs {
    /// Apply command-line values over `base`
    pub fn apply(&self, base: BookSettings) -> BookSettings {
        BookSettings {
            target_width: self.width.unwrap_or(base.target_width),
            target_height: self.height.unwrap_or(base.target_height),
            contrast_factor: self.contrast_factor.unwrap_or(base.contrast_factor),
            dithering: base.dithering && !self.no_dither,
            threshold: self.threshold.unwrap_or(base.threshold),
        }
    }
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// CBZ file
    pub archive: PathBuf,

    /// Output JPEG (default: <archive stem>.jpg)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum preview width
    #[arg(long, default_value_t = crate::archive::PREVIEW_MAX_WIDTH)]
    pub max_width: u32,

    /// Maximum preview height
    #[arg(long, default_value_t = crate::archive::PREVIEW_MAX_HEIGHT)]
    pub max_height: u32,

    #[command(flatten)]
    pub output_flags: OutputFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    // CLI-001: convert defaults
    #[test]
    fn test_convert_defaults() {
        let cli = Cli::try_parse_from(["xtc-convert", "convert", "manga/"]).unwrap();
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.input, PathBuf::from("manga/"));
        assert_eq!(args.output, PathBuf::from("output"));
        assert_eq!(args.to_overrides(), SettingsOverrides::default());
    }

    // CLI-002: overrides from flags
    #[test]
    fn test_convert_overrides() {
        let cli = Cli::try_parse_from([
            "xtc-convert",
            "convert",
            "in",
            "--width",
            "600",
            "--contrast",
            "-2",
            "--no-dither",
            "--strip",
            "--overlap",
            "20",
            "--assign",
            "7=extra.cbz",
            "-vv",
        ])
        .unwrap();
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };

        let o = args.to_overrides();
        assert_eq!(o.target_width, Some(600));
        assert_eq!(o.contrast, Some(-2));
        assert_eq!(o.dithering, Some(false));
        assert_eq!(o.strip_mode, Some(true));
        assert_eq!(o.overlap_percent, Some(20.0));
        assert_eq!(args.assignments, vec![(7, PathBuf::from("extra.cbz"))]);
        assert_eq!(args.output_flags.verbose, 2);
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("3=a.cbz").unwrap(), (3, PathBuf::from("a.cbz")));
        assert!(parse_assignment("a.cbz").is_err());
        assert!(parse_assignment("x=a.cbz").is_err());
        assert!(parse_assignment("3=").is_err());
    }

    #[test]
    fn test_book_args_apply() {
        let cli = Cli::try_parse_from([
            "xtc-convert",
            "book",
            "book.toml",
            "-o",
            "book.xtc",
            "--contrast-factor",
            "1.5",
            "--no-dither",
        ])
        .unwrap();
        let Commands::Book(args) = cli.command else {
            panic!("expected book");
        };

        let settings = args.apply(BookSettings::default());
        assert_eq!(settings.contrast_factor, 1.5);
        assert!(!settings.dithering);
        assert_eq!(settings.target_width, 480);
    }

    // CLI-003: every command carries verbosity flags
    #[test]
    fn test_output_flags_per_command() {
        let cli = Cli::try_parse_from(["xtc-convert", "inspect", "a.xtc", "-v"]).unwrap();
        assert_eq!(cli.command.output_flags().verbose, 1);

        let cli = Cli::try_parse_from(["xtc-convert", "preview", "ch.cbz", "-q"]).unwrap();
        assert!(cli.command.output_flags().quiet);

        let cli = Cli::try_parse_from(["xtc-convert", "classify", "ch.cbz"]).unwrap();
        assert_eq!(cli.command.output_flags().verbose, 0);

        let cli = Cli::try_parse_from(["xtc-convert", "info"]).unwrap();
        assert!(!cli.command.output_flags().quiet);
    }

    #[test]
    fn test_preview_defaults() {
        let cli = Cli::try_parse_from(["xtc-convert", "preview", "ch.cbz"]).unwrap();
        let Commands::Preview(args) = cli.command else {
            panic!("expected preview");
        };
        assert_eq!((args.max_width, args.max_height), (300, 500));
        assert!(args.output.is_none());
    }
}
