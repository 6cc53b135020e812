//! Content safety for administrator-authored documents.
//!
//! # Data Flow
//! ```text
//! Constrained-authoring document (compiled later):
//!     → size ceiling on the raw input
//!     → scanning view (fenced and inline code replaced by a space)
//!     → DOCUMENT_CHECKS in order, first match rejects the whole document
//!
//! Rendered HTML body:
//!     → html5ever tokenizer
//!     → rebuild from allowlisted tags and attributes
//!     → well-formed, escaped output
//! ```
//!
//! # Design Decisions
//! - The document gate rejects; the rebuilder degrades. A compile step must
//!   never see a partial document, while a renderer is better served by a
//!   cleaned one
//! - All document patterns are `regex` automata, so scans are linear in the
//!   input. A pattern that fails to compile makes its check refuse
//! - Check order is part of the contract and is pinned by tests
//! - The rebuilder never copies markup through; it writes new tags from names
//!   the policy already contains

pub mod document;
pub mod html;

pub use document::{
    assert_safe_document, scanning_view, DocumentCheck, DocumentViolation, DOCUMENT_CHECKS,
    MAX_DOCUMENT_CHARS,
};
pub use html::{sanitize_html, MAX_NESTING_DEPTH};
