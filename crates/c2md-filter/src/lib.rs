//! Exclusion filtering for c2md.
//!
//! Two levels of filtering, both pure:
//!
//! - **Page filtering** drops whole pages (with their subtrees) whose
//!   slash-joined title path matches an exclusion glob, producing a pruned
//!   [`Export`] view.
//! - **Section filtering** drops a heading and everything until the next
//!   heading of equal-or-shallower level when the heading path matches,
//!   operating on the parsed element model before Markdown emission.
//!
//! Glob semantics follow shell conventions with a literal separator: `*`
//! matches within one path segment, `**` matches across segments. Patterns
//! are case-sensitive.

use std::collections::HashSet;

use glob::{MatchOptions, Pattern};

use c2md_export::Export;
use c2md_markup::{MarkupNode, plain_text};

/// Error compiling an exclusion pattern.
#[derive(Debug, thiserror::Error)]
#[error("invalid exclusion pattern {pattern:?}: {message}")]
pub struct FilterError {
    /// The offending pattern.
    pub pattern: String,
    /// Compiler message.
    pub message: String,
}

/// Match options: `*` must not cross `/`, matching stays case-sensitive.
const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of exclusion globs.
#[derive(Clone, Debug, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile a pattern list.
    pub fn compile(patterns: &[String]) -> Result<Self, FilterError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| FilterError {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { patterns })
    }

    /// Whether any pattern matches the slash-joined path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, PATH_MATCH))
    }

    /// Whether the set holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Drop pages (and their subtrees) whose title path matches an exclusion.
///
/// Pure: returns a pruned view, the input export is untouched.
#[must_use]
pub fn filter_pages(export: &Export, exclude: &PatternSet) -> Export {
    if exclude.is_empty() {
        return export.clone();
    }

    let mut keep: HashSet<String> = HashSet::new();
    // Pre-order guarantees parents are decided before their children, so an
    // excluded ancestor prunes the whole subtree.
    for page in export.pre_order() {
        let parent_kept = page
            .parent_id
            .as_ref()
            .is_none_or(|parent| keep.contains(parent));
        if !parent_kept {
            continue;
        }
        let path = export.title_path(&page.id);
        if exclude.matches(&path) {
            tracing::debug!("excluding page subtree: {path}");
            continue;
        }
        keep.insert(page.id.clone());
    }

    export.retain(&keep)
}

/// Drop sections whose heading path matches an exclusion.
///
/// A matched heading and all content until the next heading of
/// equal-or-shallower level are removed. Returns the surviving nodes plus
/// the slash-joined paths of the skipped sections.
#[must_use]
pub fn filter_sections(
    nodes: Vec<MarkupNode>,
    exclude: &PatternSet,
) -> (Vec<MarkupNode>, Vec<String>) {
    if exclude.is_empty() {
        return (nodes, Vec::new());
    }

    let mut kept = Vec::with_capacity(nodes.len());
    let mut skipped = Vec::new();
    let mut heading_path: Vec<(u8, String)> = Vec::new();
    let mut skip_below: Option<u8> = None;

    for node in nodes {
        if let MarkupNode::Heading { level, ref children } = node {
            // Leaving a skipped section once we reach an equal-or-shallower
            // heading.
            if skip_below.is_some_and(|cap| level <= cap) {
                skip_below = None;
            }

            let text = plain_text(children);
            while heading_path
                .last()
                .is_some_and(|(prev, _)| *prev >= level)
            {
                heading_path.pop();
            }
            heading_path.push((level, text));

            if skip_below.is_none() {
                let path = heading_path
                    .iter()
                    .map(|(_, t)| t.as_str())
                    .collect::<Vec<_>>()
                    .join("/");
                if exclude.matches(&path) {
                    tracing::debug!("excluding section: {path}");
                    skipped.push(path);
                    skip_below = Some(level);
                    continue;
                }
            }
        }

        if skip_below.is_none() {
            kept.push(node);
        }
    }

    (kept, skipped)
}
