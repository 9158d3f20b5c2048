//! Error types for the adime2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AdimeError`]: a pipeline stage could not produce its output (no note
//!   text supplied, the PDF engine crashed, the remote extraction call was
//!   rejected). Most variants are absorbed at the component boundary that
//!   produced them; only input absence and rendering failures reach callers
//!   of the top-level `convert*` / `export_pdf` functions.
//!
//! * [`ImageError`]: **Non-fatal**: a single illustration failed to generate.
//!   The item keeps its text and points at the placeholder image; sibling
//!   images are unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the adime2pdf pipeline.
#[derive(Debug, Error)]
pub enum AdimeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Neither an uploaded file nor form text was supplied.
    #[error("No ADIME content provided.\nUpload a note file or paste the note text.")]
    NoContent,

    /// The uploaded note is not valid UTF-8 text.
    #[error("Note is not valid UTF-8 text: {detail}")]
    InvalidEncoding { detail: String },

    /// Note file was not found at the given path.
    #[error("Note file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// No completion backend is available (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The completion API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The completion call did not return within the configured timeout.
    #[error("LLM call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// The completion payload did not contain parseable JSON.
    #[error("Malformed extraction response: {detail}")]
    MalformedResponse { detail: String },

    /// The JSON parsed but lacks required top-level sections.
    #[error("Extraction response is missing required sections: {}", missing.join(", "))]
    MissingSections { missing: Vec<String> },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// The HTML-to-PDF engine binary could not be started.
    #[error(
        "PDF engine '{engine}' could not be started: {detail}\n\
Install WeasyPrint (`pip install weasyprint`) or point ADIME_PDF_ENGINE at a compatible binary."
    )]
    EngineNotFound { engine: String, detail: String },

    /// The engine ran but did not produce a valid PDF.
    #[error("PDF rendering failed: {detail}")]
    RenderFailed { detail: String },

    /// The engine did not finish within the configured timeout.
    #[error("PDF rendering timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdimeError {
    /// Whether this error should be shown to the person who submitted the note.
    ///
    /// Everything else is recovered inside the pipeline and only logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AdimeError::NoContent
                | AdimeError::InvalidEncoding { .. }
                | AdimeError::FileNotFound { .. }
                | AdimeError::EngineNotFound { .. }
                | AdimeError::RenderFailed { .. }
                | AdimeError::RenderTimeout { .. }
                | AdimeError::OutputWriteFailed { .. }
        )
    }
}

/// A non-fatal error for a single generated illustration.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ImageError {
    /// The image API rejected the request or returned no image.
    #[error("Image {index}: API call failed: {detail}")]
    ApiFailed { index: usize, detail: String },

    /// The image API did not answer in time.
    #[error("Image {index}: timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },

    /// The payload was returned but could not be decoded or stored.
    #[error("Image {index}: could not be decoded or saved: {detail}")]
    StoreFailed { index: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_lists_keys() {
        let e = AdimeError::MissingSections {
            missing: vec!["diagnosis".into(), "monitoring".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("diagnosis, monitoring"), "got: {msg}");
    }

    #[test]
    fn no_content_is_user_facing() {
        assert!(AdimeError::NoContent.is_user_facing());
        assert!(AdimeError::RenderTimeout { secs: 5 }.is_user_facing());
    }

    #[test]
    fn extraction_failures_are_absorbed() {
        assert!(!AdimeError::ApiTimeout { secs: 60 }.is_user_facing());
        assert!(!AdimeError::MalformedResponse {
            detail: "no json".into()
        }
        .is_user_facing());
    }

    #[test]
    fn image_timeout_display() {
        let e = ImageError::Timeout { index: 2, secs: 60 };
        assert!(e.to_string().contains("Image 2"));
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn engine_not_found_has_hint() {
        let e = AdimeError::EngineNotFound {
            engine: "weasyprint".into(),
            detail: "No such file or directory".into(),
        };
        assert!(e.to_string().contains("ADIME_PDF_ENGINE"));
    }
}
