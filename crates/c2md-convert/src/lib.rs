//! Page conversion: parsed markup to Markdown files.
//!
//! The conversion pipeline for a single page is pure with respect to the
//! filesystem: given a page, its export, the precomputed [`PathMap`] and the
//! settings, [`convert_page`] produces the complete Markdown document plus
//! any warnings. Writing the result to disk is the build layer's concern.
//!
//! A page whose body fails to parse is not an error for the run; the raw
//! content is emitted behind an explanatory comment and a warning is
//! recorded.

mod emit;
mod paths;
mod slug;

pub use paths::{PathMap, href, relative_path};
pub use slug::{filename_stem, slugify};

use std::fmt::Write as _;
use std::path::Path;

use c2md_config::Settings;
use c2md_export::{Export, Page};
use c2md_filter::{PatternSet, filter_sections};

use crate::emit::Renderer;

/// Result of converting one page.
#[derive(Debug)]
pub struct Conversion {
    /// The complete Markdown document, frontmatter included.
    pub markdown: String,
    /// Non-fatal problems encountered while rendering.
    pub warnings: Vec<String>,
    /// Slash-joined heading paths of sections dropped by exclusion globs.
    pub skipped_sections: Vec<String>,
    /// Names of macros without a dedicated conversion, in document order.
    pub unknown_macros: Vec<String>,
}

/// Convert a single page to Markdown.
///
/// `page_path` is the page's own output path from `paths`, used to compute
/// relative links to other pages.
#[must_use]
pub fn convert_page(
    page: &Page,
    export: &Export,
    paths: &PathMap,
    page_path: &Path,
    settings: &Settings,
    exclude_sections: &PatternSet,
) -> Conversion {
    let mut markdown = String::new();
    if settings.content.include_frontmatter {
        markdown.push_str(&frontmatter(page, export, settings));
    }

    match c2md_markup::parse_fragment(&page.raw_content) {
        Ok(nodes) => {
            let (nodes, skipped_sections) = filter_sections(nodes, exclude_sections);
            let mut renderer = Renderer::new(page, export, paths, page_path, settings);
            markdown.push_str(&renderer.render(&nodes));
            Conversion {
                markdown,
                warnings: renderer.warnings,
                skipped_sections,
                unknown_macros: renderer.unknown_macros,
            }
        }
        Err(e) => {
            tracing::warn!(page = %page.title, "markup parse failed: {e}");
            let _ = writeln!(markdown, "<!-- markup could not be parsed: {e} -->");
            markdown.push('\n');
            markdown.push_str(&page.raw_content);
            if !markdown.ends_with('\n') {
                markdown.push('\n');
            }
            Conversion {
                markdown,
                warnings: vec![format!("markup parse failed: {e}")],
                skipped_sections: Vec::new(),
                unknown_macros: Vec::new(),
            }
        }
    }
}

/// Build the YAML frontmatter block for a page.
///
/// Recognized fields are `title`, `id`, `space`, `path` (the slash-joined
/// title path from the space root), and `labels` (emitted as a flow list,
/// omitted when the page has none). Unrecognized fields are skipped.
fn frontmatter(page: &Page, export: &Export, settings: &Settings) -> String {
    let mut out = String::from("---\n");
    for field in &settings.content.frontmatter_fields {
        let value = match field.as_str() {
            "title" => Some(page.title.clone()),
            "id" => Some(page.id.clone()),
            "space" => Some(export.space_key.clone()),
            "path" => Some(export.title_path(&page.id)),
            "labels" => {
                if !page.labels.is_empty() {
                    let items = page
                        .labels
                        .iter()
                        .map(|l| yaml_string(l))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = writeln!(out, "labels: [{items}]");
                }
                None
            }
            other => {
                tracing::debug!("skipping unknown frontmatter field {other:?}");
                None
            }
        };
        if let Some(value) = value {
            let _ = writeln!(out, "{field}: {}", yaml_string(&value));
        }
    }
    out.push_str("---\n\n");
    out
}

/// Quote a YAML scalar, escaping backslashes and double quotes.
fn yaml_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
