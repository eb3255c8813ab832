//! Error types for export parsing.

/// Error while reading an export.
///
/// Every variant is fatal: the build aborts before writing any output.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The export structure is malformed or unexpected (missing index,
    /// no pages, hierarchy cycle).
    #[error("invalid export format: {0}")]
    Format(String),

    /// The export source could not be read.
    #[error("failed to read export")]
    Io(#[from] std::io::Error),

    /// The entities index could not be parsed as XML.
    #[error("failed to parse entities.xml")]
    Xml(#[from] quick_xml::Error),

    /// Text in the entities index could not be decoded.
    #[error("invalid text encoding in entities.xml")]
    Encoding(#[from] quick_xml::encoding::EncodingError),
}
