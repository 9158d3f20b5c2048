//! Pipeline stages for note-to-report conversion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the remote collaborators (chat model, image API,
//! PDF engine) can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ images ──▶ report ──▶ assets ──▶ pdf
//! (text)    (LLM or      (image     (HTML)     (sanitise)  (engine
//!            rules)       API)                             subprocess)
//! ```
//!
//! 1. [`input`]: choose between uploaded bytes and pasted text
//! 2. [`extract`]: structured document from the note; remote call through
//!    [`llm`], JSON pulled out by [`parse`], [`fallback`] rules otherwise
//! 3. [`images`]: one illustration per leading action item, in order
//! 4. [`report`]: escaped HTML fragment for preview and export
//! 5. [`assets`]: strip screen-only markup, point images at local files
//! 6. [`pdf`]: run the HTML-to-PDF engine under a timeout

pub mod assets;
pub mod extract;
pub mod fallback;
pub mod images;
pub mod input;
pub mod llm;
pub mod parse;
pub mod pdf;
pub mod report;
