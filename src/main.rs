//! dirscan - scan, snapshot and compare directory trees.
//!
//! Usage:
//!   dirscan DIR                  List every entry below DIR
//!   dirscan DIR -o FILE          Store a snapshot of DIR in a scanfile
//!   dirscan -d DIR               Find duplicated files
//!   dirscan LEFT RIGHT           Compare two trees
//!
//! Any DIR may also be a scanfile written with `-o`.

use std::cell::Cell;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use dirscan_analyze::{
    compare_entries, parse_compare_types, Classification, CompareConfig, CompareStats,
    Comparison, ContentIndex, Ignores, TreeStats, COMPARE_TYPES_DEFAULT_COMPARE,
    COMPARE_TYPES_DEFAULT_SCAN,
};
use dirscan_core::{Entry, EntryRef, EntryType, ScanError, WalkConfig};
use dirscan_scan::{ProgressReporter, ScanProgress, TandemWalk};
use dirscan_scanfile::{is_scanfile, quote, read_scanfile, ScanfileError, ScanfileWriter};

const PROG: &str = "dirscan";

#[derive(Parser)]
#[command(
    name = "dirscan",
    version,
    about = "Scan, snapshot and compare directory trees",
    long_about = "dirscan lists a directory tree, stores it in a scanfile, or compares \
                  two trees entry by entry.\n\n\
                  LEFT and RIGHT may each be a directory or a scanfile."
)]
struct Cli {
    /// Directory or scanfile to scan, or the left side of a compare
    left: PathBuf,

    /// Right side of a compare
    right: Option<PathBuf>,

    /// Show all entries, and the payload in long listings
    #[arg(short, long)]
    all: bool,

    /// Long listing with mode, owner, size and time
    #[arg(short, long)]
    long: bool,

    /// Human readable sizes
    #[arg(long)]
    human: bool,

    /// Report files with duplicated contents
    #[arg(short, long)]
    duplicates: bool,

    /// Write a scanfile
    #[arg(short, long, value_name = "FILE")]
    outfile: Option<PathBuf>,

    /// Classification codes to show, `all`, or `^codes` to hide from the default
    #[arg(short = 't', long = "compare-types", value_name = "CODES")]
    compare_types: Option<String>,

    /// Exclude paths matching the glob pattern (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "PATTERN")]
    excludes: Vec<String>,

    /// Differences to ignore: u(id), g(id), p(ermissions), t(ime)
    #[arg(short, long, default_value = "", value_name = "LETTERS")]
    ignore: String,

    /// Visit entries in reverse order
    #[arg(short, long)]
    reverse: bool,

    /// Stay on the file system of each root
    #[arg(short = 'X', long = "one-file-system")]
    one_file_system: bool,

    /// Descend into directories present on one side only
    #[arg(short = 's', long)]
    recurse: bool,

    /// Report time differences even when nothing else differs
    #[arg(long)]
    compare_time: bool,

    /// Detect renamed files by content
    #[arg(long)]
    sha: bool,

    /// Directory inside scanfiles to use as root
    #[arg(long, value_name = "PATH")]
    prefix: Option<String>,

    /// Directory inside the left scanfile to use as root
    #[arg(long, value_name = "PATH")]
    left_prefix: Option<String>,

    /// Directory inside the right scanfile to use as root
    #[arg(long, value_name = "PATH")]
    right_prefix: Option<String>,

    /// Print nothing per entry
    #[arg(short, long)]
    quiet: bool,

    /// Print a summary to stderr
    #[arg(long)]
    summary: bool,

    /// Do not print errors for unreadable entries
    #[arg(short = 'E', long)]
    quiet_errors: bool,

    /// Show progress on stderr
    #[arg(short = 'P', long)]
    progress: bool,

    /// Output format
    #[arg(short = 'F', long, default_value = "text")]
    format: OutputFormat,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'D', long, action = ArgAction::Count)]
    debug: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// What the run does with the walked entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scan,
    Duplicates,
    Compare,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.debug);

    let errors = run(&cli)?;
    if errors > 0 {
        eprintln!("\n{PROG}: **** {errors} files or directories could not be read");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn init_logging(level: u8) {
    let default = match level {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the scan or compare. Returns the number of per-entry errors.
fn run(cli: &Cli) -> Result<u64> {
    let mode = match (&cli.right, cli.duplicates) {
        (None, false) => Mode::Scan,
        (None, true) => Mode::Duplicates,
        (Some(_), false) => Mode::Compare,
        (Some(_), true) => bail!("--duplicates works on a single tree"),
    };
    if mode == Mode::Compare && cli.outfile.is_some() {
        bail!("Writing to an outfile is not supported when comparing directories");
    }
    if mode != Mode::Compare && cli.sha {
        bail!("--sha only works when comparing two trees");
    }

    let default_types = match mode {
        Mode::Scan => COMPARE_TYPES_DEFAULT_SCAN,
        Mode::Duplicates => "d",
        Mode::Compare => COMPARE_TYPES_DEFAULT_COMPARE,
    };
    let types_arg = match (&cli.compare_types, mode) {
        (Some(types), _) => types.as_str(),
        (None, Mode::Compare) if cli.all => "all",
        (None, _) => "",
    };
    let shown = parse_compare_types(types_arg, default_types)?;

    let ignores: Ignores = cli.ignore.parse()?;
    let compare_config = CompareConfig::builder()
        .ignores(ignores)
        .no_compare(!shown.iter().any(|c| c.needs_compare()))
        .ignore_time(!cli.compare_time)
        .build()?;

    let one_sided = match mode {
        Mode::Compare if !cli.recurse && !cli.sha => None,
        _ => Some(true),
    };
    let walk_config = WalkConfig::builder()
        .reverse(cli.reverse)
        .excludes(cli.excludes.clone())
        .one_filesystem(cli.one_file_system)
        .traverse_one_sided(one_sided)
        .sequential(mode != Mode::Compare)
        .build()?;
    debug!(?walk_config, ?compare_config, "Parsed options");

    let mut roots = vec![load_tree(
        &cli.left,
        cli.left_prefix.as_deref().or(cli.prefix.as_deref()),
    )?];
    if let Some(right) = &cli.right {
        roots.push(load_tree(
            right,
            cli.right_prefix.as_deref().or(cli.prefix.as_deref()),
        )?);
    }

    let errors = Cell::new(0u64);
    let on_error = |err: &ScanError| {
        errors.set(errors.get() + 1);
        if !cli.quiet_errors {
            eprintln!("{PROG}: {err}");
        }
        true
    };

    let index = if mode == Mode::Duplicates || cli.sha {
        let progress = cli.progress.then(|| progress_reporter("Hashed"));
        let index = ContentIndex::build(&roots, &walk_config, on_error, progress)
            .wrap_err("Failed to build content index")?;
        clear_progress(cli.progress);
        Some(index)
    } else {
        None
    };

    let mut writer = match &cli.outfile {
        Some(path) => Some(
            ScanfileWriter::create(path)
                .wrap_err_with(|| format!("Failed to create {}", path.display()))?,
        ),
        None => None,
    };

    let mut stats = CompareStats::new(roots.len());
    let mut printed_hashes = HashSet::new();
    let print = !cli.quiet && writer.is_none();

    let mut walk = TandemWalk::new(roots, &walk_config)?.with_error_handler(on_error);
    if cli.progress {
        let prefix = if mode == Mode::Compare { "Compared" } else { "Scanned" };
        walk = walk.with_progress(progress_reporter(prefix));
    }

    for item in walk {
        let (relpath, entries) = item?;
        let comparison = compare_entries(&entries, &compare_config, index.as_ref());
        if comparison.classification == Classification::Error {
            errors.set(errors.get() + 1);
            if !cli.quiet_errors {
                eprintln!("{PROG}: {}", comparison.text);
            }
        }
        stats.add_classification(comparison.classification);

        if let Some(writer) = writer.as_mut() {
            store(writer, &relpath, &entries, &on_error)?;
        }

        if !shown.contains(&comparison.classification) {
            continue;
        }
        stats.add_entries(&entries);
        if !print {
            continue;
        }

        match (cli.format, mode) {
            (OutputFormat::Json, _) => {
                let line = JsonLine::new(&relpath, &comparison, &entries, &on_error)?;
                println!("{}", serde_json::to_string(&line)?);
            }
            (OutputFormat::Text, Mode::Compare) => {
                println!(
                    "{}  {}  :  {}",
                    comparison.classification.arrow(),
                    relpath.display(),
                    capitalize(&comparison.text)
                );
            }
            (OutputFormat::Text, Mode::Duplicates) if cli.compare_types.is_none() => {
                if let Some(index) = &index {
                    print_duplicates(&entries[0], index, &mut printed_hashes);
                }
            }
            (OutputFormat::Text, _) => {
                let marker = if comparison.classification == Classification::Duplicated {
                    "DUP  "
                } else {
                    ""
                };
                println!("{marker}{}", listing(&entries[0], cli)?);
            }
        }
    }
    clear_progress(cli.progress);

    if let Some(writer) = writer {
        let records = writer.records();
        writer.finish()?;
        debug!(records, "Wrote scanfile");
    }

    if cli.summary {
        print_summary(mode, cli, &stats, errors.get());
    }
    Ok(errors.get())
}

/// Open a directory or a scanfile as a tree root.
fn load_tree(path: &Path, prefix: Option<&str>) -> Result<EntryRef> {
    if is_scanfile(path)? {
        debug!(path = %path.display(), ?prefix, "Reading scanfile");
        return Ok(read_scanfile(path, prefix)?);
    }
    Ok(Entry::root(path)?)
}

/// Store the left entry of an item, unless it is excluded.
fn store<W: Write>(
    writer: &mut ScanfileWriter<W>,
    relpath: &Path,
    entries: &[EntryRef],
    on_error: &impl Fn(&ScanError) -> bool,
) -> Result<()> {
    let Some(entry) = entries.first().filter(|e| !e.is_excluded()) else {
        return Ok(());
    };
    match writer.write_entry(relpath, entry) {
        // Entries that cannot be read completely are left out
        Err(ScanfileError::Scan(err)) if on_error(&err) => Ok(()),
        other => Ok(other?),
    }
}

fn progress_reporter<'a>(prefix: &'a str) -> ProgressReporter<'a> {
    ProgressReporter::new(Duration::from_millis(200), move |p: &ScanProgress| {
        eprint!("\r\x1b[K{prefix} {} files:  {}", p.count, p.current_path.display());
    })
}

fn clear_progress(enabled: bool) {
    if enabled {
        eprint!("\r\x1b[K");
    }
}

/// One entry in text form: the path, or a long listing.
fn listing(entry: &Entry, cli: &Cli) -> Result<String> {
    let path = quote(
        &dirscan_scanfile::os_to_bytes(entry.full_path().as_os_str()),
        false,
    );
    if !cli.long {
        return Ok(path);
    }

    let size = if cli.human {
        humansize::format_size(entry.size(), humansize::BINARY)
    } else {
        entry.size().to_string()
    };
    let mtime = entry
        .metadata()
        .modified()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();
    let mut line = format!(
        "{}  {:>6} {:>6}  {:>10}  {}  {}  {}",
        entry.mode_string(),
        entry.uid(),
        entry.gid(),
        size,
        mtime,
        entry.entry_type().code(),
        path
    );
    if cli.all {
        let payload = entry.payload_text()?;
        if !payload.is_empty() {
            line.push_str("  ");
            line.push_str(&payload);
        }
    }
    Ok(line)
}

/// Print every file sharing the contents of `entry`, once per content.
fn print_duplicates(
    entry: &Entry,
    index: &ContentIndex,
    printed: &mut HashSet<dirscan_core::ContentHash>,
) {
    let Ok(Some(hash)) = entry.content_hash() else {
        return;
    };
    if !printed.insert(hash) {
        return;
    }
    let mut paths: Vec<PathBuf> = index
        .bucket(&hash)
        .iter()
        .map(|file| file.entry.full_path())
        .collect();
    paths.sort();
    println!("File duplicated {} times:", paths.len());
    for path in paths {
        println!("    {}", path.display());
    }
    println!();
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_summary(mode: Mode, cli: &Cli, stats: &CompareStats, errors: u64) {
    let left = cli.left.display();
    let size = |bytes: u64| {
        if cli.human {
            humansize::format_size(bytes, humansize::BINARY)
        } else {
            format!("{bytes} bytes")
        }
    };

    if mode != Mode::Compare {
        let tree = stats.tree(0).copied().unwrap_or_default();
        eprintln!("\nSummary of '{left}':");
        print_tree_counts(&tree, &size(tree.file_bytes));
        eprintln!("In total {} file objects", tree.total());
        return;
    }

    let right = cli
        .right
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    eprintln!("\nSummary of compare between left '{left}' and right '{right}':");
    let lines = [
        (Classification::Equal, "equal files or directories".to_string()),
        (Classification::Changed, "changed files or directories".to_string()),
        (Classification::DifferentType, "files of same name but different type".to_string()),
        (Classification::LeftOnly, format!("files or directories only in left '{left}'")),
        (Classification::RightOnly, format!("files or directories only in right '{right}'")),
        (Classification::LeftRenamed, format!("files renamed in right '{right}'")),
        (Classification::RightRenamed, format!("files renamed in left '{left}'")),
        (Classification::LeftNewer, format!("newer files in left '{left}'")),
        (Classification::RightNewer, format!("newer files in right '{right}'")),
        (Classification::Excluded, "excluded files or directories".to_string()),
        (Classification::Error, "compare errors".to_string()),
        (Classification::Skipped, "skipped comparisons".to_string()),
    ];
    for (classification, text) in lines {
        let count = stats.count(classification);
        if count > 0 {
            eprintln!("    {count}  {text}");
        }
    }
    if errors > 0 {
        eprintln!("    {errors}  errors");
    }
    eprintln!("In total {} file objects", stats.total());
}

fn print_tree_counts(tree: &TreeStats, bytes: &str) {
    if tree.files > 0 {
        eprintln!("    {}  files, total {bytes}", tree.files);
    }
    if tree.dirs > 0 {
        eprintln!("    {}  directories", tree.dirs);
    }
    if tree.symlinks > 0 {
        eprintln!("    {}  symbolic links", tree.symlinks);
    }
    if tree.special() > 0 {
        eprintln!(
            "    {}  special files  ({} block devices, {} char devices, {} fifos, {} sockets)",
            tree.special(),
            tree.block_devices,
            tree.char_devices,
            tree.fifos,
            tree.sockets
        );
    }
    if tree.excluded > 0 {
        eprintln!("    {}  excluded files or directories", tree.excluded);
    }
}

/// JSON form of one walk item.
#[derive(Serialize)]
struct JsonLine {
    relpath: String,
    classification: Classification,
    code: char,
    text: String,
    entries: Vec<Option<JsonEntry>>,
}

#[derive(Serialize)]
struct JsonEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: EntryType,
    size: u64,
    mode: String,
    uid: u32,
    gid: u32,
    mtime: f64,
    excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

impl JsonLine {
    fn new(
        relpath: &Path,
        comparison: &Comparison,
        entries: &[EntryRef],
        on_error: &impl Fn(&ScanError) -> bool,
    ) -> Result<Self> {
        Ok(Self {
            relpath: relpath.display().to_string(),
            classification: comparison.classification,
            code: comparison.classification.code(),
            text: comparison.text.clone(),
            entries: entries
                .iter()
                .map(|e| JsonEntry::new(e, on_error))
                .collect::<Result<_>>()?,
        })
    }
}

impl JsonEntry {
    fn new(entry: &Entry, on_error: &impl Fn(&ScanError) -> bool) -> Result<Option<Self>> {
        if entry.is_missing() {
            return Ok(None);
        }
        // Hashes live files that have not been hashed yet
        let payload = match entry.payload_text() {
            Ok(payload) => Some(payload).filter(|p| !p.is_empty()),
            Err(err) if on_error(&err) => None,
            Err(err) => return Err(err.into()),
        };
        Ok(Some(Self {
            path: entry.full_path().display().to_string(),
            entry_type: entry.entry_type(),
            size: entry.size(),
            mode: entry.mode_string(),
            uid: entry.uid(),
            gid: entry.gid(),
            mtime: entry.mtime(),
            excluded: entry.is_excluded(),
            payload,
        }))
    }
}
