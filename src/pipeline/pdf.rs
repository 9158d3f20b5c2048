//! PDF rendering through an external HTML-to-PDF engine.
//!
//! The engine (WeasyPrint by default) runs as a child process:
//!
//! ```text
//! <engine> <input.html> <output.pdf> --base-url <dir> --stylesheet <print.css>
//! ```
//!
//! Input HTML and the print stylesheet are staged in temp files that are
//! removed when the render finishes. Every render writes to a fresh
//! `{pdf_dir}/{uuid}.pdf`, so concurrent renders never share a path.
//!
//! A render either returns a file that starts with the `%PDF` magic or an
//! error; a partially written file is deleted before the error is returned.
//! The child is killed if the render is cancelled or times out.

use crate::config::PipelineConfig;
use crate::error::AdimeError;
use crate::output::RenderedPdf;
use crate::pipeline::assets::AssetResolver;
use crate::progress::ProgressCallback;
use crate::styles::PRINT_STYLESHEET;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Characters of engine stderr kept in error messages.
const STDERR_EXCERPT_CHARS: usize = 500;

/// Renders sanitised HTML to PDF files.
pub struct PdfRenderer {
    engine: PathBuf,
    pdf_dir: PathBuf,
    base_dir: PathBuf,
    base_url: String,
    timeout: Duration,
    keep_debug_html: bool,
    progress: Option<ProgressCallback>,
}

impl PdfRenderer {
    pub fn new(config: &PipelineConfig) -> Self {
        let resolver = AssetResolver::from_config(config);
        Self {
            engine: config.pdf_engine.clone(),
            pdf_dir: config.pdf_dir(),
            base_dir: resolver.base_dir().to_path_buf(),
            base_url: resolver.base_url().to_string(),
            timeout: Duration::from_secs(config.render_timeout_secs),
            keep_debug_html: config.keep_debug_html,
            progress: config.progress_callback.clone(),
        }
    }

    /// Render `html` (a fragment or a full document) to a new PDF file.
    pub async fn render(&self, html: &str) -> Result<RenderedPdf, AdimeError> {
        let start = Instant::now();
        if let Some(ref cb) = self.progress {
            cb.on_render_start();
        }

        tokio::fs::create_dir_all(&self.pdf_dir)
            .await
            .map_err(|e| AdimeError::OutputWriteFailed {
                path: self.pdf_dir.clone(),
                source: e,
            })?;

        let document = wrap_document(html, &self.base_url);
        let html_file = stage("html", &document)?;
        let css_file = stage("css", PRINT_STYLESHEET)?;

        let id = uuid::Uuid::new_v4();
        let file_name = format!("{}.pdf", id);
        let output = self.pdf_dir.join(&file_name);

        if self.keep_debug_html {
            let debug_path = self.pdf_dir.join(format!("{}.html", id));
            match tokio::fs::write(&debug_path, &document).await {
                Ok(()) => debug!("Kept render input at {}", debug_path.display()),
                Err(e) => warn!("Could not keep render input {}: {}", debug_path.display(), e),
            }
        }

        let result = match self
            .run_engine(html_file.path(), css_file.path(), &output)
            .await
        {
            Ok(()) => read_pdf(&output).await,
            Err(e) => Err(e),
        };

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&output).await;
                return Err(e);
            }
        };

        info!(
            "Rendered {} ({} bytes) in {:?}",
            output.display(),
            bytes.len(),
            start.elapsed()
        );
        if let Some(ref cb) = self.progress {
            cb.on_render_complete(bytes.len());
        }

        Ok(RenderedPdf {
            path: output,
            file_name,
            bytes,
        })
    }

    async fn run_engine(&self, html: &Path, css: &Path, output: &Path) -> Result<(), AdimeError> {
        let engine = self.engine.display().to_string();
        debug!("Launching PDF engine: {}", engine);

        let child = Command::new(&self.engine)
            .arg(html)
            .arg(output)
            .arg("--base-url")
            .arg(&self.base_dir)
            .arg("--stylesheet")
            .arg(css)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdimeError::EngineNotFound {
                engine: engine.clone(),
                detail: e.to_string(),
            })?;

        let finished = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdimeError::RenderTimeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| AdimeError::RenderFailed {
                detail: format!("waiting for {}: {}", engine, e),
            })?;

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            return Err(AdimeError::RenderFailed {
                detail: format!(
                    "{} exited with {}: {}",
                    engine,
                    finished.status,
                    stderr_excerpt(&stderr)
                ),
            });
        }
        Ok(())
    }
}

/// Wrap a fragment in a complete document carrying charset and base URL.
///
/// Input that already has an `<html>` element is returned unchanged; the
/// engine's `--base-url` argument covers it.
pub fn wrap_document(html: &str, base_url: &str) -> String {
    if html.to_ascii_lowercase().contains("<html") {
        return html.to_string();
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<base href=\"{}\">\n<title>ADIME Report</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        base_url, html
    )
}

fn stage(extension: &str, contents: &str) -> Result<NamedTempFile, AdimeError> {
    let mut file = tempfile::Builder::new()
        .prefix("adime-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|e| AdimeError::Internal(format!("tempfile: {e}")))?;
    file.write_all(contents.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| AdimeError::Internal(format!("tempfile write: {e}")))?;
    Ok(file)
}

async fn read_pdf(path: &Path) -> Result<Vec<u8>, AdimeError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AdimeError::RenderFailed {
            detail: format!("engine produced no output at {}: {}", path.display(), e),
        })?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AdimeError::RenderFailed {
            detail: format!(
                "output is not a PDF ({} bytes, starts with {:?})",
                bytes.len(),
                String::from_utf8_lossy(&bytes[..bytes.len().min(8)])
            ),
        });
    }
    Ok(bytes)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
    }
}

/// Tail of the engine's stderr, which is where the actual error usually is.
fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let skip = count - STDERR_EXCERPT_CHARS;
    format!("...{}", trimmed.chars().skip(skip).collect::<String>())
}
