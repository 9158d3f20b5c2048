//! Input resolution: pick the note text out of what the caller supplied.
//!
//! A note arrives either as uploaded file bytes or as pasted text. The
//! upload wins when both are present, matching the web form where the file
//! picker overrides the text box.

use crate::error::AdimeError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Choose and decode the note text.
///
/// # Errors
/// * [`AdimeError::InvalidEncoding`]: the upload is not UTF-8.
/// * [`AdimeError::NoContent`]: neither source carries any non-blank text.
pub fn resolve_note(upload: Option<&[u8]>, text: Option<&str>) -> Result<String, AdimeError> {
    if let Some(bytes) = upload.filter(|b| !b.is_empty()) {
        let decoded = std::str::from_utf8(strip_bom(bytes)).map_err(|e| {
            AdimeError::InvalidEncoding {
                detail: e.to_string(),
            }
        })?;
        if !decoded.trim().is_empty() {
            debug!("Using uploaded note ({} bytes)", bytes.len());
            return Ok(decoded.to_string());
        }
    }

    match text.filter(|t| !t.trim().is_empty()) {
        Some(t) => {
            debug!("Using pasted note ({} chars)", t.chars().count());
            Ok(t.to_string())
        }
        None => Err(AdimeError::NoContent),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Read a note from a file, or from stdin when `path` is `-`.
pub fn read_note_file(path: &str) -> Result<String, AdimeError> {
    let bytes = if path == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| AdimeError::Internal(format!("reading stdin: {e}")))?;
        buf
    } else {
        read_local(Path::new(path))?
    };
    resolve_note(Some(&bytes), None)
}

fn read_local(path: &Path) -> Result<Vec<u8>, AdimeError> {
    std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AdimeError::FileNotFound {
            path: PathBuf::from(path),
        },
        _ => AdimeError::Internal(format!("reading {}: {}", path.display(), e)),
    })
}
