//! CLI binary for block-paginator.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PaginatorConfig`, drains events on the main thread and prints results.

use anyhow::{bail, Context, Result};
use block_paginator::{
    block_index_for_offset, event_channel, BlockPages, PagedDocument, Paginator,
    PaginatorConfig, PagingEvent,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress using indicatif ─────────────────────────────────────────────

/// Terminal progress: one bar over blocks plus a log line per finished
/// block. Fed from the main thread, so no locking is needed.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total_blocks: usize) -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} blocks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total_blocks as u64);
        bar.set_style(style);
        bar.set_prefix("Paginating");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn block_ready(&self, block: &BlockPages) {
        self.bar.println(format!(
            "  {} Block {:>4}  {}{}",
            green("✓"),
            block.block_index,
            dim(&format!("{:>5} pages", block.pages.len())),
            if block.is_priority {
                format!("  {}", cyan("priority"))
            } else {
                String::new()
            },
        ));
        self.bar.inc(1);
    }

    fn finish(&self, doc: &PagedDocument) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages from {} blocks in {}ms",
            green("✔"),
            bold(&doc.total_pages().to_string()),
            doc.stats.total_blocks,
            doc.stats.duration_ms,
        );
    }

    fn fail(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Paginate a file, pages concatenated on stdout
  paginate book.txt

  # 500-character pages, form feed between pages, written to a file
  paginate --chars-per-page 500 --separator ff book.txt -o book.paged.txt

  # Reader is at character 120000: page that block first
  paginate --position 120000 --workers 8 book.txt --json > book.json

  # Print only page 42 (1-indexed)
  paginate --page 42 book.txt

  # Read from stdin
  cat book.txt | paginate -

BOUNDARY POLICY:
  Blocks are cut before pages. Keep --block-size a multiple of
  --chars-per-page to get exactly the pages whole-text pagination would give;
  otherwise each block ends with a short page.

ENVIRONMENT VARIABLES:
  PAGINATE_CHARS_PER_PAGE  Default for --chars-per-page
  PAGINATE_BLOCK_SIZE      Default for --block-size
  PAGINATE_WORKERS         Default for --workers
  RUST_LOG                 Overrides the log filter (e.g. block_paginator=debug)
"#;

/// Split text into fixed-size pages on a pool of worker threads.
#[derive(Parser, Debug)]
#[command(
    name = "paginate",
    version,
    about = "Split text into fixed-size pages on a pool of worker threads",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Text file to paginate, or `-` for stdin.
    input: PathBuf,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "PAGINATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Maximum characters per page.
    #[arg(long, env = "PAGINATE_CHARS_PER_PAGE", default_value_t = 1000)]
    chars_per_page: usize,

    /// Maximum characters per block (the unit of parallel work).
    #[arg(long, env = "PAGINATE_BLOCK_SIZE", default_value_t = 10_000)]
    block_size: usize,

    /// Worker threads. Default: available parallelism, capped at 4.
    #[arg(short, long, env = "PAGINATE_WORKERS")]
    workers: Option<usize>,

    /// Block to page first (0-indexed). Negative or out of range: none.
    #[arg(long, allow_negative_numbers = true, conflicts_with = "position")]
    priority_block: Option<i64>,

    /// Reader position as a character offset; its block is paged first.
    #[arg(long)]
    position: Option<usize>,

    /// Give up if the run takes longer than this many seconds.
    #[arg(long, env = "PAGINATE_TIMEOUT")]
    timeout_secs: Option<u64>,

    /// Print only this page (1-indexed).
    #[arg(long)]
    page: Option<usize>,

    /// Page separator for text output: none, ff, hr, comment, or custom string.
    #[arg(long, env = "PAGINATE_SEPARATOR", default_value = "none")]
    separator: String,

    /// Output the paged document as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PAGINATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; keep library
    // logs at error level while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let text = read_input(&cli.input)?;
    let config = build_config(&cli)?;
    let total_blocks = text.chars().count().div_ceil(config.block_size);

    // ── Run ──────────────────────────────────────────────────────────────
    let (listener, mut events) = event_channel();
    let paginator =
        Paginator::new(text, config, Arc::new(listener)).context("Invalid configuration")?;
    paginator.start_paging().context("Failed to start pagination")?;

    let progress = show_progress.then(|| CliProgress::new(total_blocks));
    let mut document = None;
    while let Some(event) = events.recv_blocking() {
        match event {
            PagingEvent::BlockReady(block) => {
                if let Some(ref p) = progress {
                    p.block_ready(&block);
                }
            }
            PagingEvent::AllBlocksReady(doc) => {
                if let Some(ref p) = progress {
                    p.finish(&doc);
                }
                document = Some(doc);
                break;
            }
            PagingEvent::RunFailed(err) => {
                if let Some(ref p) = progress {
                    p.fail(&err.to_string());
                }
                return Err(err).context("Pagination failed");
            }
        }
    }
    paginator.shutdown();
    let document = document.context("Pagination stopped before completing")?;

    // ── Output ───────────────────────────────────────────────────────────
    let rendered = render_output(&cli, &document)?;
    match cli.output {
        Some(ref path) => {
            write_atomic(path, rendered.as_bytes())?;
            if !cli.quiet {
                eprintln!(
                    "{}  {} pages  →  {}",
                    green("✔"),
                    document.total_pages(),
                    bold(&path.display().to_string()),
                );
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.is_empty() && !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet && !show_progress {
        eprintln!(
            "Paginated {} pages from {} blocks in {}ms",
            document.total_pages(),
            document.stats.total_blocks,
            document.stats.duration_ms
        );
    }

    Ok(())
}

/// Map CLI args to `PaginatorConfig`.
fn build_config(cli: &Cli) -> Result<PaginatorConfig> {
    let mut builder = PaginatorConfig::builder()
        .chars_per_page(cli.chars_per_page)
        .block_size(cli.block_size);

    if let Some(n) = cli.workers {
        builder = builder.worker_count(n);
    }
    if let Some(index) = cli.priority_block {
        builder = builder.priority_block_signed(index);
    }
    if let Some(offset) = cli.position {
        if let Some(index) = block_index_for_offset(offset, cli.block_size) {
            builder = builder.priority_block(index);
        }
    }
    if let Some(secs) = cli.timeout_secs {
        builder = builder.barrier_timeout(Duration::from_secs(secs));
    }

    builder.build().context("Invalid configuration")
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Produce the text (or JSON) that goes to stdout / the output file.
fn render_output(cli: &Cli, doc: &PagedDocument) -> Result<String> {
    if let Some(n) = cli.page {
        if n < 1 {
            bail!("Pages are 1-indexed, minimum is 1 (got {n})");
        }
        let page = doc
            .page(n - 1)
            .with_context(|| format!("Page {n} is out of range ({} pages)", doc.total_pages()))?;
        return Ok(page.to_string());
    }

    if cli.json {
        return serde_json::to_string_pretty(doc).context("Failed to serialise output");
    }

    let separator = parse_separator(&cli.separator);
    let mut out = String::new();
    for (i, page) in doc.pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(i + 1));
        }
        out.push_str(page);
    }
    Ok(out)
}

/// How to separate pages in text output.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Separator {
    None,
    FormFeed,
    HorizontalRule,
    Comment,
    Custom(String),
}

impl Separator {
    /// Separator placed before page `page_num` (1-indexed).
    fn render(&self, page_num: usize) -> String {
        match self {
            Separator::None => String::new(),
            Separator::FormFeed => "\x0c".to_string(),
            Separator::HorizontalRule => "\n\n---\n\n".to_string(),
            Separator::Comment => format!("\n<!-- page {page_num} -->\n"),
            Separator::Custom(s) => s.clone(),
        }
    }
}

fn parse_separator(s: &str) -> Separator {
    match s.to_lowercase().as_str() {
        "none" | "" => Separator::None,
        "ff" | "formfeed" => Separator::FormFeed,
        "hr" | "---" => Separator::HorizontalRule,
        "comment" => Separator::Comment,
        _ => Separator::Custom(s.to_string()),
    }
}

/// Write via a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
