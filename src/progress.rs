//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn ReportProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as a note moves through extraction, illustration and rendering.
//!
//! # Example
//!
//! ```rust
//! use adime2pdf::{ReportProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     images: AtomicUsize,
//! }
//!
//! impl ReportProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, placeholder: bool) {
//!         self.images.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("image {}/{} (placeholder: {})", index, total, placeholder);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { images: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ExtractionMethod;
use std::sync::Arc;

/// Called by the pipeline as it processes a note.
///
/// Implementations must be `Send + Sync`: image events fire from concurrent
/// futures. All methods default to no-ops.
pub trait ReportProgressCallback: Send + Sync {
    /// Called before the extractor looks at the note.
    fn on_extraction_start(&self, note_len: usize) {
        let _ = note_len;
    }

    /// Called once the note has been turned into a document.
    fn on_extraction_complete(&self, method: &ExtractionMethod, action_items: usize) {
        let _ = (method, action_items);
    }

    /// Called before an illustration is requested.
    ///
    /// `index` is 1-based.
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an illustration slot is filled, by a real image or the
    /// placeholder.
    fn on_image_complete(&self, index: usize, total: usize, placeholder: bool) {
        let _ = (index, total, placeholder);
    }

    /// Called before the PDF engine is launched.
    fn on_render_start(&self) {}

    /// Called when the PDF has been written.
    fn on_render_complete(&self, bytes: usize) {
        let _ = bytes;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ReportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ReportProgressCallback>;
