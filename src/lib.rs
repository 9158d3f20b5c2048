//! # adime2pdf
//!
//! Turn free-form ADIME nutrition notes (Assessment, Diagnosis,
//! Intervention, Monitoring/Evaluation) into structured, illustrated,
//! patient-friendly reports and print-ready PDFs.
//!
//! ## Why this crate?
//!
//! Dietitians write ADIME notes for colleagues, not patients. This crate asks
//! a chat model to restate the note as structured, plain-language JSON,
//! illustrates the first few recommendations, and prints the result. When
//! the model is unavailable or answers badly, a rule-based parser keeps the
//! pipeline going, so a note always produces a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! note text
//!  │
//!  ├─ 1. Input     uploaded bytes or pasted text
//!  ├─ 2. Extract   chat model → JSON, or keyword rules on failure
//!  ├─ 3. Images    up to 3 illustrations, placeholder on failure
//!  ├─ 4. Report    escaped HTML fragment (preview / edit)
//!  ├─ 5. Assets    strip screen-only markup, rewrite image paths
//!  └─ 6. PDF       external engine (WeasyPrint) under a timeout
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adime2pdf::{convert_note_to_pdf, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OPENAI_API_KEY enables the remote tiers; without it everything runs offline.
//!     let config = PipelineConfig::from_env()?;
//!     let note = std::fs::read_to_string("note.txt")?;
//!     let pdf = convert_note_to_pdf(&note, "report.pdf", &config).await?;
//!     eprintln!("{} bytes", pdf.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `adime2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! adime2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod styles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, MAX_IMAGES};
pub use convert::{
    convert_note, convert_note_sync, convert_note_to_pdf, ensure_assets, export_pdf, extract_note,
    write_pdf,
};
pub use error::{AdimeError, ImageError};
pub use output::{ExtractionMethod, ExtractionOutcome, NoteReport, RenderedPdf};
pub use pipeline::assets::AssetResolver;
pub use pipeline::extract::TextExtractor;
pub use pipeline::images::{ImageBackend, ImageGenerator};
pub use pipeline::input::resolve_note;
pub use pipeline::llm::CompletionBackend;
pub use pipeline::pdf::PdfRenderer;
pub use pipeline::report::{render_report, ReportOptions};
pub use progress::{NoopProgressCallback, ProgressCallback, ReportProgressCallback};
pub use schema::{
    ActionItem, AdimeDocument, AssessmentData, DiagnosisData, ImageInfo, InterventionData,
    MonitoringData,
};
