//! Top-level entry points tying the pipeline stages together.
//!
//! The web flow is two requests: [`convert_note`] turns a note into a
//! previewable report, and after the clinician has edited it
//! [`export_pdf`] prints the edited markup. [`convert_note_to_pdf`] runs both
//! back to back for command-line use.
//!
//! Only missing input and PDF rendering failures surface as errors here.
//! Extraction and illustration problems are absorbed by their stages and
//! show up as [`ExtractionMethod::Fallback`] or placeholder images instead.

use crate::config::PipelineConfig;
use crate::error::AdimeError;
use crate::output::{ExtractionMethod, ExtractionOutcome, NoteReport, RenderedPdf};
use crate::pipeline::assets::AssetResolver;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::images::{ensure_placeholder, ImageGenerator};
use crate::pipeline::input::resolve_note;
use crate::pipeline::pdf::PdfRenderer;
use crate::pipeline::report::{render_report, ReportOptions};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Create the asset directories and the placeholder image.
///
/// Call once at startup; safe to call again.
pub fn ensure_assets(config: &PipelineConfig) -> Result<(), AdimeError> {
    for dir in [config.image_dir(), config.pdf_dir()] {
        std::fs::create_dir_all(&dir).map_err(|e| AdimeError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;
    }
    let placeholder = ensure_placeholder(config)?;
    debug!("Assets ready (placeholder: {})", placeholder.display());
    Ok(())
}

/// Extract a structured document without illustrating or rendering it.
pub async fn extract_note(
    text: &str,
    config: &PipelineConfig,
) -> Result<ExtractionOutcome, AdimeError> {
    let note = resolve_note(None, Some(text))?;
    Ok(TextExtractor::new(config).extract_with_outcome(&note).await)
}

/// Turn note text into a structured, illustrated report.
///
/// # Errors
/// Returns [`AdimeError::NoContent`] when `text` is blank; every other
/// problem degrades inside the pipeline.
pub async fn convert_note(text: &str, config: &PipelineConfig) -> Result<NoteReport, AdimeError> {
    let start = Instant::now();
    let ExtractionOutcome { document, method } = extract_note(text, config).await?;

    let images = ImageGenerator::new(config).generate(&document).await;
    let html = render_report(&document, &images, ReportOptions::default());

    info!(
        "Report ready in {:?}: {} action items, {} illustrations",
        start.elapsed(),
        document.action_items().len(),
        images.len()
    );

    Ok(NoteReport {
        document,
        method,
        images,
        html,
    })
}

/// Sanitise report markup and render it to a new PDF.
pub async fn export_pdf(html: &str, config: &PipelineConfig) -> Result<RenderedPdf, AdimeError> {
    let sanitised = AssetResolver::from_config(config).resolve(html);
    PdfRenderer::new(config).render(&sanitised).await
}

/// Run the whole pipeline and copy the PDF to `output_path`.
///
/// The copy is written to a temp file and renamed into place, so a reader
/// never sees a partial PDF at `output_path`.
pub async fn convert_note_to_pdf(
    text: &str,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RenderedPdf, AdimeError> {
    ensure_assets(config)?;
    let report = convert_note(text, config).await?;
    if let ExtractionMethod::Fallback { ref reason } = report.method {
        debug!("Report built by rule-based parser: {}", reason);
    }
    let pdf = export_pdf(&report.html, config).await?;

    write_pdf(&pdf, output_path.as_ref()).await?;
    Ok(pdf)
}

/// Copy a rendered PDF to `path` via temp file + rename.
pub async fn write_pdf(pdf: &RenderedPdf, path: &Path) -> Result<(), AdimeError> {
    let write_err = |source: std::io::Error| AdimeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &pdf.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_err)?;

    info!("Wrote {} ({} bytes)", path.display(), pdf.len());
    Ok(())
}

/// Synchronous wrapper around [`convert_note`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_note_sync(text: &str, config: &PipelineConfig) -> Result<NoteReport, AdimeError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AdimeError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_note(text, config))
}
