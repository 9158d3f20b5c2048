//! CLI binary for adime2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use adime2pdf::pipeline::input::read_note_file;
use adime2pdf::{
    convert_note, ensure_assets, export_pdf, extract_note, resolve_note, write_pdf,
    ExtractionMethod, PipelineConfig, ProgressCallback, ReportProgressCallback,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner for the current stage plus one log
/// line per finished stage. Image events may arrive out of order.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, note_len: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("{note_len} bytes of note text"));
    }

    fn on_extraction_complete(&self, method: &ExtractionMethod, action_items: usize) {
        let mark = if method.is_fallback() {
            yellow("⚠")
        } else {
            green("✓")
        };
        self.bar.println(format!(
            "  {} Structured note via {}  {}",
            mark,
            method,
            dim(&format!("{action_items} action items"))
        ));
    }

    fn on_image_start(&self, index: usize, total: usize) {
        self.bar.set_prefix("Illustrating");
        self.bar.set_message(format!("image {index}/{total}"));
    }

    fn on_image_complete(&self, index: usize, total: usize, placeholder: bool) {
        if placeholder {
            self.bar.println(format!(
                "  {} Image {index}/{total}  {}",
                yellow("⚠"),
                dim("placeholder")
            ));
        } else {
            self.bar
                .println(format!("  {} Image {index}/{total}", green("✓")));
        }
    }

    fn on_render_start(&self) {
        self.bar.set_prefix("Rendering");
        self.bar.set_message("PDF engine running…");
    }

    fn on_render_complete(&self, bytes: usize) {
        self.bar.println(format!(
            "  {} PDF rendered  {}",
            green("✓"),
            dim(&format!("{bytes} bytes"))
        ));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Note file to PDF
  adime2pdf note.txt -o report.pdf

  # Note from stdin, keep the report HTML for review
  cat note.txt | adime2pdf - -o report.pdf --html-out report.html

  # Inline text, structured JSON only (no images, no PDF)
  adime2pdf --text "ASSESSMENT: ... DIAGNOSIS: ..." --extract-only

  # Offline run: rule-based extraction, placeholder images
  adime2pdf --dev-mode note.txt -o report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY      Enables remote extraction and image generation
  ADIME_DEV_MODE      Placeholder mode: never call remote services
  ADIME_MODEL         Chat model for extraction (default gpt-4o)
  ADIME_STATIC_DIR    Directory for generated images and PDFs (default ./static)
  ADIME_PDF_ENGINE    HTML-to-PDF binary (default weasyprint)
  RUST_LOG            Log filter, overrides --verbose / --quiet

SETUP:
  1. Install the PDF engine:  pip install weasyprint
  2. Set API key:             export OPENAI_API_KEY=sk-...
  3. Convert:                 adime2pdf note.txt -o report.pdf
"#;

/// Turn ADIME nutrition notes into illustrated patient reports.
#[derive(Parser, Debug)]
#[command(
    name = "adime2pdf",
    version,
    about = "Turn ADIME nutrition notes into illustrated patient-friendly PDF reports",
    long_about = "Parse a free-form ADIME note (Assessment, Diagnosis, Intervention, \
Monitoring/Evaluation) into structured data with a chat model, illustrate the first \
recommendations, and print the report to PDF. Without an API key the note is parsed \
by keyword rules and placeholder images are used.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Note file path, or `-` for stdin.
    #[arg(conflicts_with = "text")]
    input: Option<String>,

    /// Note text given inline instead of a file.
    #[arg(short, long)]
    text: Option<String>,

    /// Copy the rendered PDF to this path.
    #[arg(short, long, env = "ADIME_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the report HTML to this path.
    #[arg(long)]
    html_out: Option<PathBuf>,

    /// Print the structured report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Stop after extraction and print the structured note as JSON.
    #[arg(long)]
    extract_only: bool,

    /// Skip illustrations entirely.
    #[arg(long)]
    no_images: bool,

    /// Chat model used for extraction.
    #[arg(long, env = "ADIME_MODEL")]
    model: Option<String>,

    /// LLM provider name passed to the provider factory.
    #[arg(long, env = "ADIME_PROVIDER")]
    provider: Option<String>,

    /// Extraction temperature (0.0–2.0).
    #[arg(long, env = "ADIME_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "ADIME_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Extraction call timeout in seconds.
    #[arg(long, env = "ADIME_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// PDF render timeout in seconds.
    #[arg(long, env = "ADIME_RENDER_TIMEOUT", default_value_t = 120)]
    render_timeout: u64,

    /// Directory for generated images and PDFs.
    #[arg(long, env = "ADIME_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// HTML-to-PDF engine binary.
    #[arg(long, env = "ADIME_PDF_ENGINE")]
    pdf_engine: Option<PathBuf>,

    /// Keep the sanitised HTML next to each rendered PDF.
    #[arg(long)]
    keep_html: bool,

    /// Never call remote services (ADIME_DEV_MODE=1 also works).
    #[arg(long)]
    dev_mode: bool,

    /// Disable progress output.
    #[arg(long, env = "ADIME_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ADIME_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ADIME_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; --verbose brings them all back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.extract_only;
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

    let note = read_note(&cli)?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let outcome = extract_note(&note, &config)
            .await
            .context("Extraction failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise document")?
        );
        return Ok(());
    }

    // ── Full pipeline ────────────────────────────────────────────────────
    ensure_assets(&config).context("Failed to prepare asset directories")?;
    let report = convert_note(&note, &config)
        .await
        .context("Conversion failed")?;

    if let Some(ref path) = cli.html_out {
        tokio::fs::write(path, &report.html)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }

    if cli.json && cli.output.is_none() {
        return Ok(());
    }

    let pdf = export_pdf(&report.html, &config)
        .await
        .context("PDF rendering failed")?;

    let destination = match cli.output {
        Some(ref path) => {
            write_pdf(&pdf, path)
                .await
                .context("Failed to write PDF")?;
            path.clone()
        }
        None => pdf.path.clone(),
    };

    if !cli.json {
        println!("{}", destination.display());
    }
    if !cli.quiet {
        eprintln!(
            "{}  {}  {}",
            green("✔"),
            bold(&destination.display().to_string()),
            dim(&format!(
                "{} bytes, {} illustrations, {}",
                pdf.len(),
                report.images.len(),
                report.method
            )),
        );
    }

    Ok(())
}

/// Read the note from the positional input or `--text`.
fn read_note(cli: &Cli) -> Result<String> {
    match cli.input {
        Some(ref path) => read_note_file(path).with_context(|| format!("Failed to read {path}")),
        None => resolve_note(None, cli.text.as_deref()).context("No note supplied"),
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .apply_env()
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .render_timeout_secs(cli.render_timeout)
        .keep_debug_html(cli.keep_html);

    if cli.dev_mode {
        builder = builder.dev_mode(true);
    }
    if cli.no_images {
        builder = builder.max_images(0);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref dir) = cli.static_dir {
        builder = builder.static_dir(dir);
    }
    if let Some(ref engine) = cli.pdf_engine {
        builder = builder.pdf_engine(engine);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
