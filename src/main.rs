mod cli;
mod grouping;
mod metadata;
mod scanner;
mod transfer;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    // Validate paths
    if !args.search.exists() {
        anyhow::bail!("Search directory does not exist: {}", args.search.display());
    }
    if !args.search.is_dir() {
        anyhow::bail!("Search path is not a directory: {}", args.search.display());
    }

    if args.dry_run {
        println!("==== DRY RUN ====");
    }

    println!("Collecting files in {}...", args.search.display());
    let filter = scanner::ExtensionFilter::parse(&args.extensions);
    if filter.is_empty() {
        tracing::warn!(
            "Extension list {:?} has no suffixes, no files will match",
            args.extensions
        );
    }
    let files = scanner::scan_files(&args.search, &filter)?;
    if files.is_empty() {
        println!("No files matching {} found.", args.extensions);
        return Ok(());
    }
    println!("Found {} files. Categorizing by date taken...", files.len());

    // Resolve a date for every file before anything is moved
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Reading metadata {pos}/{len} {wide_bar} {msg}")?
            .progress_chars("=> "),
    );
    let mut sources = metadata::SourceCounts::default();
    let groups = grouping::group_by_date(
        &files,
        |path| {
            let resolved = metadata::resolve(path);
            sources.record(resolved.as_ref());
            grouping::DateKey::from(resolved.map(|r| r.date))
        },
        |dates, processed| {
            pb.set_position(processed as u64);
            pb.set_message(format!("{} dates", dates));
        },
    );
    pb.finish_and_clear();

    tracing::debug!(
        "Grouped {} files into {} dates",
        groups.file_count(),
        groups.len()
    );
    println!(
        "Dated {} files from metadata, {} from modified time, {} without a date",
        sources.metadata, sources.modified, sources.undated
    );
    println!(
        "Will be moving files to {} directories in: {}",
        groups.len(),
        args.outdir.display()
    );

    let plans = transfer::plan_moves(&groups, &args.outdir, args.collision_policy());

    if !args.dry_run {
        std::fs::create_dir_all(&args.outdir)
            .with_context(|| format!("Failed to create directory {}", args.outdir.display()))?;
    }
    let summary = transfer::execute_plan(&plans, args.dry_run)?;

    let verb = if args.dry_run { "Would move" } else { "Moved" };
    println!(
        "{} {} files ({} renamed), skipped {}, failed {}",
        verb, summary.moved, summary.renamed, summary.skipped, summary.failed
    );

    if summary.failed > 0 {
        anyhow::bail!("{} file(s) could not be moved", summary.failed);
    }

    println!("Done.");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
