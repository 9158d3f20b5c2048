//! Result types returned by the pipeline entry points.

use crate::schema::{AdimeDocument, ImageInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which tier of the extractor produced a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// The remote model returned schema-conforming JSON.
    Remote,
    /// The rule-based parser produced the document.
    Fallback { reason: String },
}

impl ExtractionMethod {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ExtractionMethod::Fallback { .. })
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Remote => write!(f, "remote model"),
            ExtractionMethod::Fallback { reason } => write!(f, "rule-based fallback ({reason})"),
        }
    }
}

/// A document plus the path that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub document: AdimeDocument,
    pub method: ExtractionMethod,
}

/// Everything produced for one note before PDF export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteReport {
    pub document: AdimeDocument,
    pub method: ExtractionMethod,
    /// One entry per illustrated action item, in action-item order.
    pub images: Vec<ImageInfo>,
    /// Report markup, ready for editing or export.
    pub html: String,
}

/// A successfully rendered PDF.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    /// Unique location the engine wrote to.
    pub path: PathBuf,
    /// File name offered to the downloader.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RenderedPdf {
    pub const CONTENT_TYPE: &'static str = "application/pdf";

    pub fn content_type(&self) -> &'static str {
        Self::CONTENT_TYPE
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_method_serialises_with_reason() {
        let m = ExtractionMethod::Fallback {
            reason: "no credentials".into(),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["method"], "fallback");
        assert_eq!(v["reason"], "no credentials");
        assert!(m.is_fallback());
        assert!(m.to_string().contains("no credentials"));
    }

    #[test]
    fn remote_method_display() {
        assert_eq!(ExtractionMethod::Remote.to_string(), "remote model");
        assert!(!ExtractionMethod::Remote.is_fallback());
    }
}
