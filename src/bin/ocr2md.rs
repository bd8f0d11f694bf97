//! CLI binary for edgequake-ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessingConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr2md::pipeline::input::default_output_path;
use edgequake_ocr2md::{
    process_file, process_to_file, rephrase, PageSeparator, ProcessingConfig,
    ProcessingProgressCallback, ProgressCallback, RefineMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Shorten `s` to at most `max` chars, ending with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// page. Pages complete out of order, so start times are kept per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_processing_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading OCR response…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_processing_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_refine_fallback(&self, page_num: usize, reason: &str) {
        self.bar.println(format!(
            "  {} Page {:>3}  kept unrefined: {}",
            yellow("↺"),
            page_num,
            dim(&truncate(reason, 70)),
        ));
    }

    fn on_processing_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Resolve images and rebuild tables (stdout)
  ocr2md scan.json

  # Write to a file, images served from a public host
  ocr2md scan.json -o scan.md --base-url https://reader.example.org

  # Add an LLM proof-reading pass
  ocr2md --refine --document-type "academic paper" scan.json -o paper.md

  # Read the OCR response from a URL
  ocr2md https://jobs.example.org/results/42.json -o result.md

  # Full structured result
  ocr2md --json scan.json > result.json

  # Rewrite existing markdown (use - for stdin)
  ocr2md --rephrase summarize notes.md
  cat notes.md | ocr2md --rephrase eli5 -

ENVIRONMENT VARIABLES:
  BACKEND_URL             Public origin serving stored images
  GEMINI_API_KEY          Google Gemini API key (preferred for refinement)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Turn OCR page output into clean Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Turn OCR page output into clean Markdown",
    long_about = "Post-process an OCR engine's JSON response: store embedded images and point \
the markdown at their public URLs, rebuild malformed tables, and optionally run an LLM \
proof-reading pass that falls back to the deterministic result on any failure.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// OCR response JSON (path or HTTP/HTTPS URL). With --rephrase: a text file or `-`.
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "OCR2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Write next to the input's name with a `.md` extension (ignored with -o).
    #[arg(short = 'O', long)]
    auto_output: bool,

    /// Public origin that serves stored images.
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:8001")]
    base_url: String,

    /// URL path under --base-url where images are served.
    #[arg(long, env = "OCR2MD_IMAGE_PREFIX", default_value = "/api/v1/images")]
    image_prefix: String,

    /// Directory where images are stored.
    #[arg(long, env = "OCR2MD_STORAGE_DIR", default_value = "static/temp_images")]
    storage_dir: PathBuf,

    /// Pages processed at once.
    #[arg(short, long, env = "OCR2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Run the LLM refinement pass on every page.
    #[arg(long, env = "OCR2MD_REFINE")]
    refine: bool,

    /// Document type given to the LLM as context.
    #[arg(long, env = "OCR2MD_DOCUMENT_TYPE", default_value = "cheatsheet")]
    document_type: String,

    /// Rewrite the input text instead of processing an OCR response.
    #[arg(long, value_enum, value_name = "MODE")]
    rephrase: Option<RephraseArg>,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "OCR2MD_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "OCR2MD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per LLM call.
    #[arg(long, env = "OCR2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "OCR2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Output structured JSON (ProcessingOutput) instead of Markdown.
    #[arg(long, env = "OCR2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2MD_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "OCR2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RephraseArg {
    Refine,
    Summarize,
    Eli5,
    RemoveJargon,
}

impl From<RephraseArg> for RefineMode {
    fn from(v: RephraseArg) -> Self {
        match v {
            RephraseArg::Refine => RefineMode::Refine,
            RephraseArg::Summarize => RefineMode::Summarize,
            RephraseArg::Eli5 => RefineMode::Eli5,
            RephraseArg::RemoveJargon => RefineMode::RemoveJargon,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.json && cli.rephrase.is_none();
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

    let output_path = cli
        .output
        .clone()
        .or_else(|| cli.auto_output.then(|| default_output_path(&cli.input)));

    // ── Rephrase mode ────────────────────────────────────────────────────
    if let Some(mode) = cli.rephrase {
        let config = build_config(&cli, None)?;
        let text = read_text(&cli.input).await?;
        let rewritten = rephrase(&text, mode.into(), &cli.document_type, &config)
            .await
            .context("Rephrase failed")?;
        return emit(output_path.as_deref(), &rewritten).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ProcessingProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run processing ───────────────────────────────────────────────────
    if let (Some(ref output_path), false) = (&output_path, cli.json) {
        let stats = process_to_file(&cli.input, output_path, &config)
            .await
            .context("Processing failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {}ms  →  {}",
                if stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.processed_pages,
                stats.total_pages,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} images  /  {} tables  /  {} refined",
                dim(&stats.images_saved.to_string()),
                dim(&stats.tables_rebuilt.to_string()),
                dim(&stats.refined_pages.to_string()),
            );
        }
    } else {
        let output = process_file(&cli.input, &config)
            .await
            .context("Processing failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            emit(output_path.as_deref(), &json).await?;
        } else {
            emit(
                output_path.as_deref(),
                &output.markdown_with(&config.page_separator),
            )
            .await?;
        }

        if !cli.quiet && !show_progress {
            eprintln!(
                "Processed {}/{} pages in {}ms ({} images, {} tables)",
                output.stats.processed_pages,
                output.stats.total_pages,
                output.stats.total_duration_ms,
                output.stats.images_saved,
                output.stats.tables_rebuilt,
            );
            if output.stats.failed_pages > 0 {
                eprintln!("  {} pages failed", output.stats.failed_pages);
            }
            if output.stats.refine_fallbacks > 0 {
                eprintln!("  {} pages kept unrefined", output.stats.refine_fallbacks);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .base_url(cli.base_url.clone())
        .image_path_prefix(cli.image_prefix.clone())
        .storage_dir(cli.storage_dir.clone())
        .concurrency(cli.concurrency)
        .refine(cli.refine)
        .document_type(cli.document_type.clone())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .page_separator(parse_separator(&cli.separator))
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Text for --rephrase: a file, or stdin for `-`.
async fn read_text(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {input}"))
}

/// Write `text` to `path`, or stdout when there is none.
async fn emit(path: Option<&Path>, text: &str) -> Result<()> {
    if let Some(path) = path {
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(());
    }
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
