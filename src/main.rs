//! xtc-convert - Comic archive and e-book converter for XTC/XTG e-ink readers
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Level;
use xtc_convert::{
    build_book_container, classify_paths, exit_codes, first_page_preview, ArchiveError, BookArgs,
    BookRender, ChapterClassification, ChapterConverter, ClassifyArgs, Cli, Commands, Config,
    ConfigError, ConvertArgs, ConvertError, InspectArgs, PreviewArgs, Settings, XtcError,
    XtcReader,
};
use xtc_convert::book::BookManifest;
use xtc_convert::cli::OutputFlags;
use xtc_convert::progress::{apply_event, build_progress_bar, OutputMode};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.command.output_flags());

    let result = match cli.command {
        Commands::Convert(args) => run_convert(&args),
        Commands::Classify(args) => run_classify(&args),
        Commands::Inspect(args) => run_inspect(&args),
        Commands::Book(args) => run_book(&args),
        Commands::Preview(args) => run_preview(&args),
        Commands::Info => run_info(),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    });
}

/// Map an error chain to a process exit code
///
/// The most specific cause wins: a missing archive wrapped in a conversion
/// error is still a missing input.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    let causes = || err.chain();

    if causes().any(|c| c.downcast_ref::<ConfigError>().is_some()) {
        return exit_codes::INVALID_ARGS;
    }
    if causes().any(|c| {
        matches!(
            c.downcast_ref::<ArchiveError>(),
            Some(ArchiveError::NotFound(_))
        )
    }) {
        return exit_codes::INPUT_NOT_FOUND;
    }
    if causes()
        .any(|c| c.downcast_ref::<XtcError>().is_some() || c.downcast_ref::<ConvertError>().is_some())
    {
        return exit_codes::OUTPUT_ERROR;
    }
    exit_codes::GENERAL_ERROR
}

/// Install the stderr log subscriber
fn init_logging(flags: &OutputFlags) {
    let level = match (flags.quiet, flags.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        _ => Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Config from `--config` or the default search path
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p)
            .with_context(|| format!("Failed to load config file {}", p.display())),
        None => match Config::load() {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::warn!("Ignoring config file: {}", e);
                Ok(Config::default())
            }
        },
    }
}

/// Size the global rayon pool
fn init_threads(threads: Option<usize>) {
    let count = threads.unwrap_or_else(num_cpus::get);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(count)
        .build_global()
    {
        tracing::debug!("Thread pool already initialized: {}", e);
    }
}

// ============ Convert Command ============

fn run_convert(args: &ConvertArgs) -> anyhow::Result<i32> {
    let start_time = Instant::now();
    let mode = OutputMode::from_flags(args.output_flags.verbose, args.output_flags.quiet);

    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let archives = collect_archives(&args.input)?;
    if archives.is_empty() && args.assignments.is_empty() {
        eprintln!("Error: No CBZ files found in {}", args.input.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let config = load_config(args.config.as_deref())?;
    let settings = config.merge_with_cli(&args.to_overrides())?;

    let mut classification = classify_paths(&archives);
    apply_assignments(&mut classification, &args.assignments);

    if !classification.unrecognized.is_empty() && !args.skip_unrecognized {
        eprintln!("Could not determine the chapter number of:");
        for path in &classification.unrecognized {
            eprintln!("  {}", path.display());
        }
        eprintln!("Assign them with --assign CHAPTER=PATH or pass --skip-unrecognized.");
        return Ok(exit_codes::NEEDS_REVIEW);
    }
    if classification.recognized.is_empty() {
        eprintln!("Error: No chapters to convert");
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let title = args.title.clone().unwrap_or_else(|| default_title(&args.input));

    if args.dry_run {
        print_execution_plan(args, &title, &settings, &classification.recognized);
        return Ok(exit_codes::SUCCESS);
    }

    init_threads(settings.threads);
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let converter = ChapterConverter::new(settings, &args.output, &title);
    let mut batch = converter.batch(&classification.recognized);
    let bar = build_progress_bar(batch.total() as u64, mode);
    for event in batch.by_ref() {
        apply_event(&bar, &event, mode);
    }
    bar.finish_and_clear();

    let summary = batch.finish()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if mode != OutputMode::Quiet {
        println!();
        println!("{}", "=".repeat(60));
        println!("Conversion Summary");
        println!("{}", "=".repeat(60));
        println!("  Output:       {}", summary.root.display());
        println!("  Chapters:     {}", summary.outputs.len());
        println!("  Failed:       {}", summary.failures.len());
        println!("  Files:        {}", summary.files_written());
        println!("  Skipped imgs: {}", summary.skipped_entries());
        println!("  Time:         {:.2}s", start_time.elapsed().as_secs_f64());
        println!("{}", "=".repeat(60));
        for failure in &summary.failures {
            println!("  chapter {}: {}", failure.chapter, failure.error);
        }
    }

    Ok(if summary.is_success() {
        exit_codes::SUCCESS
    } else {
        exit_codes::GENERAL_ERROR
    })
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cbz") || e.eq_ignore_ascii_case("zip"))
}

/// Archives in a file or directory input
fn collect_archives(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut archives = Vec::new();

    if input.is_file() {
        if is_archive(input) {
            archives.push(input.to_path_buf());
        }
    } else if input.is_dir() {
        for entry in std::fs::read_dir(input)? {
            let path = entry?.path();
            if path.is_file() && is_archive(&path) {
                archives.push(path);
            }
        }
        archives.sort();
    }

    Ok(archives)
}

/// Path form used to compare archive locations
fn normalize_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.components().collect())
}

/// Hand assignments win over classification
fn apply_assignments(classification: &mut ChapterClassification, assignments: &[(u32, PathBuf)]) {
    for (chapter, path) in assignments {
        let target = normalize_path(path);
        classification
            .unrecognized
            .retain(|p| normalize_path(p) != target);
        classification
            .recognized
            .retain(|_, p| normalize_path(p) != target);

        if let Some(replaced) = classification.recognized.insert(*chapter, path.clone()) {
            tracing::warn!(
                "Chapter {} reassigned from {} to {}",
                chapter,
                replaced.display(),
                path.display()
            );
        }
    }
}

fn default_title(input: &Path) -> String {
    let name = if input.is_dir() {
        input.file_name()
    } else {
        input.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

fn print_execution_plan(
    args: &ConvertArgs,
    title: &str,
    settings: &Settings,
    chapters: &BTreeMap<u32, PathBuf>,
) {
    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Input:  {}", args.input.display());
    println!("Output: {}", args.output.join(title).display());
    println!();
    println!("Settings:");
    println!("  Page size:  {}x{}", settings.target_width, settings.target_height);
    println!("  Contrast:   {}", settings.contrast);
    println!("  Dithering:  {}", if settings.dithering { "YES" } else { "NO" });
    println!("  Threshold:  {}", settings.threshold);
    if settings.strip_mode {
        println!("  Mode:       long strip ({}% overlap)", settings.overlap_percent);
    } else {
        println!("  Mode:       page");
    }
    println!("  Threads:    {}", settings.threads.unwrap_or_else(num_cpus::get));
    println!();
    println!("Chapters:");
    for (num, path) in chapters {
        println!("  {:>4}  {}", num, path.display());
    }
}

// ============ Classify Command ============

fn run_classify(args: &ClassifyArgs) -> anyhow::Result<i32> {
    let mut archives = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            archives.extend(collect_archives(path)?);
        } else {
            archives.push(path.clone());
        }
    }

    let classification = classify_paths(&archives);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
    } else {
        println!("Recognized:");
        for (num, path) in &classification.recognized {
            println!("  {:>4}  {}", num, path.display());
        }
        if !classification.unrecognized.is_empty() {
            println!("Unrecognized:");
            for path in &classification.unrecognized {
                println!("        {}", path.display());
            }
        }
    }

    Ok(if classification.is_complete() {
        exit_codes::SUCCESS
    } else {
        exit_codes::NEEDS_REVIEW
    })
}

// ============ Inspect Command ============

fn run_inspect(args: &InspectArgs) -> anyhow::Result<i32> {
    if !args.file.exists() {
        eprintln!("Error: File not found: {}", args.file.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let reader = XtcReader::open(&args.file)
        .with_context(|| format!("Invalid container {}", args.file.display()))?;

    if args.verify || args.extract.is_some() {
        let pages = reader.decode_all()?;
        if let Some(dir) = &args.extract {
            std::fs::create_dir_all(dir)?;
            for (i, page) in pages.iter().enumerate() {
                let path = dir.join(format!("page_{:04}.png", i + 1));
                page.to_image()
                    .save(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    }

    let info = reader.info();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(exit_codes::SUCCESS);
    }

    let header = &info.header;
    println!("File:       {} ({} bytes)", args.file.display(), info.file_size);
    println!("Version:    0x{:04x}", header.version);
    println!("Pages:      {}", header.page_count);
    println!("Direction:  {:?}", header.read_direction);
    println!("Current:    {}", header.current_page);
    if let Some(meta) = &info.metadata {
        println!("Title:      {}", meta.title);
        println!("Author:     {}", meta.author);
        println!("Language:   {}", meta.language);
        println!("Generator:  {}", meta.generator);
        if let Some(ts) = chrono::DateTime::from_timestamp(meta.timestamp as i64, 0) {
            println!("Created:    {}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    if !info.chapters.is_empty() {
        println!("Chapters:");
        for ch in &info.chapters {
            println!("  {:>5}-{:<5} {}", ch.start_page, ch.end_page, ch.name);
        }
    }
    if let Some(first) = info.pages.first() {
        println!("Page size:  {}x{}", first.width, first.height);
    }
    if args.verify {
        println!("Verified:   all {} pages OK", reader.page_count());
    }

    Ok(exit_codes::SUCCESS)
}

// ============ Book Command ============

fn run_book(args: &BookArgs) -> anyhow::Result<i32> {
    let mode = OutputMode::from_flags(args.output_flags.verbose, args.output_flags.quiet);

    if !args.manifest.exists() {
        eprintln!("Error: Manifest not found: {}", args.manifest.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    let config = load_config(args.config.as_deref())?;
    let settings = args.apply(config.book).validate()?;

    let manifest = BookManifest::load(&args.manifest)?;
    let base_dir = args
        .manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let (source, engine) = manifest.into_parts(&base_dir);

    let mut render = BookRender::new(&engine, &source, settings.clone());
    let bar = build_progress_bar(render.total() as u64, mode);
    for event in render.by_ref() {
        apply_event(&bar, &event, mode);
    }
    bar.finish_and_clear();

    let book = render.finish()?;
    let written = build_book_container(&book, &settings, &args.output)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&written)?);
    } else if mode != OutputMode::Quiet {
        println!(
            "Wrote {} ({} pages, {} chapters, {} bytes)",
            written.path.display(),
            written.pages,
            book.chapters.len(),
            written.bytes
        );
    }
    Ok(exit_codes::SUCCESS)
}

// ============ Preview Command ============

fn run_preview(args: &PreviewArgs) -> anyhow::Result<i32> {
    let Some(jpeg) = first_page_preview(&args.archive, args.max_width, args.max_height)? else {
        eprintln!("Error: No page images in {}", args.archive.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    };

    let output = args.output.clone().unwrap_or_else(|| {
        let stem = args
            .archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "preview".to_string());
        PathBuf::from(format!("{}.jpg", stem))
    });
    std::fs::write(&output, &jpeg)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("{} ({} bytes)", output.display(), jpeg.len());
    Ok(exit_codes::SUCCESS)
}

// ============ Info Command ============

fn run_info() -> anyhow::Result<i32> {
    println!("xtc-convert v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Default Settings:");
    let defaults = Settings::default();
    println!("  Page size: {}x{}", defaults.target_width, defaults.target_height);
    println!("  Contrast:  {}", defaults.contrast);
    println!("  Overlap:   {}%", defaults.overlap_percent);
    println!("  Threshold: {}", defaults.threshold);

    println!();
    println!("Config File Locations:");
    for path in Config::search_paths() {
        let status = if path.is_file() { "found" } else { "not found" };
        println!("  {} ({})", path.display(), status);
    }

    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    // MAIN-001: a missing archive inside a conversion error is "not found"
    #[test]
    fn test_exit_code_missing_archive_wrapped() {
        let err = anyhow::Error::from(ConvertError::Archive(ArchiveError::NotFound(
            PathBuf::from("ch1.cbz"),
        )));
        assert_eq!(exit_code_for(&err), exit_codes::INPUT_NOT_FOUND);

        let err = anyhow::Error::from(ConvertError::NoImages(PathBuf::from("ch1.cbz")));
        assert_eq!(exit_code_for(&err), exit_codes::OUTPUT_ERROR);

        let err = anyhow::Error::from(ArchiveError::NotFound(PathBuf::from("a.cbz")))
            .context("Preview failed");
        assert_eq!(exit_code_for(&err), exit_codes::INPUT_NOT_FOUND);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), exit_codes::GENERAL_ERROR);
    }

    // MAIN-002: assignments match archives by normalized path
    #[test]
    fn test_apply_assignments_normalizes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let extra = dir.path().join("extra.cbz");
        let first = dir.path().join("Series 001.cbz");
        std::fs::write(&extra, b"").unwrap();
        std::fs::write(&first, b"").unwrap();

        let mut classification = classify_paths(&[first.clone(), extra.clone()]);
        assert_eq!(classification.unrecognized.len(), 1);

        let dotted = dir.path().join(".").join("extra.cbz");
        apply_assignments(&mut classification, &[(2, dotted.clone())]);

        assert!(classification.unrecognized.is_empty());
        assert_eq!(classification.recognized[&1], first);
        assert_eq!(classification.recognized[&2], dotted);
    }

    // MAIN-003: reassigning a taken number replaces that archive
    #[test]
    fn test_apply_assignments_replaces_taken_number() {
        let first = PathBuf::from("Series 001.cbz");
        let other = PathBuf::from("Series 001 (alt).cbz");
        let mut classification = classify_paths(&[first]);

        apply_assignments(&mut classification, &[(1, other.clone())]);

        assert_eq!(classification.recognized.len(), 1);
        assert_eq!(classification.recognized[&1], other);
    }
}
