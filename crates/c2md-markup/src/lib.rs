//! Markup element model and parser for c2md.
//!
//! Parses Confluence storage format (XHTML with `ac:`/`ri:` namespaces) or
//! plain export HTML into a tree of [`MarkupNode`]s. Parsing runs in two
//! stages:
//!
//! 1. `xml`: quick-xml event stream into a generic tag/attrs/text tree
//! 2. `lower`: generic tree into the closed [`MarkupNode`] element set
//!
//! The element set is deliberately closed so downstream consumers (the
//! Markdown emitter, the section filter) can match exhaustively instead of
//! inspecting tag names.

mod entities;
mod error;
mod lower;
mod node;
mod xml;

pub use error::MarkupError;
pub use node::{
    ImageSource, LinkTarget, MarkupNode, PanelKind, TaskItem, TextStyle, plain_text,
};
pub use xml::XmlNode;

/// Parse a markup fragment into the element model.
///
/// Accepts Confluence storage format or exported HTML. The input does not
/// need a single root element.
///
/// # Errors
///
/// Returns [`MarkupError`] when the fragment is not well-formed enough to
/// tokenize. Callers that must never fail (the converter) degrade to raw
/// passthrough on error.
pub fn parse_fragment(input: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let tree = xml::parse_tree(input)?;
    Ok(lower::lower_fragment(&tree))
}
