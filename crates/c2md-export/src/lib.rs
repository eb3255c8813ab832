//! Confluence export parsing for c2md.
//!
//! Reads an extracted space export into an [`Export`]: an id-indexed arena
//! of [`Page`]s with ordered parent/child links. Two export flavors are
//! supported:
//!
//! - **XML exports** carry an `entities.xml` index with page objects,
//!   storage-format bodies, hierarchy, and attachment records
//! - **HTML exports** are inferred one page per `.html` file, with hierarchy
//!   taken from directory nesting when present
//!
//! Archive extraction is the caller's concern; this crate only reads an
//! already-extracted directory tree.

mod error;
mod html_export;
mod tree;
mod xml_export;

use std::path::Path;

pub use error::ExportError;
pub use tree::{Attachment, Export, Page};

/// Parse an extracted export directory.
///
/// Dispatches on the presence of `entities.xml`: XML-style exports are read
/// from the index file, anything else is treated as an HTML export.
///
/// # Errors
///
/// [`ExportError::Io`] when the directory cannot be read,
/// [`ExportError::Format`] when no pages can be extracted or the hierarchy
/// contains a cycle.
pub fn parse(path: &Path) -> Result<Export, ExportError> {
    if !path.is_dir() {
        return Err(ExportError::Format(format!(
            "export source is not a directory: {}",
            path.display()
        )));
    }

    if path.join("entities.xml").is_file() {
        tracing::debug!("parsing XML export from {}", path.display());
        xml_export::parse(path)
    } else {
        tracing::debug!("parsing HTML export from {}", path.display());
        html_export::parse(path)
    }
}

/// Derive a stable page id from a path when the export provides none.
///
/// SHA-256 of the relative path, truncated to 12 hex characters.
pub(crate) fn path_id(relative: &Path) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(relative.to_string_lossy().as_bytes());
    hex::encode(&digest[..6])
}
