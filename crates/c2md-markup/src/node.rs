//! The closed markup element set.

/// Inline text style wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextStyle {
    /// `**bold**`
    Bold,
    /// `*italic*`
    Italic,
    /// `~~strikethrough~~`
    Strike,
    /// No Markdown equivalent, rendered as `<u>`.
    Underline,
    /// No Markdown equivalent, rendered as `<sub>`.
    Subscript,
    /// No Markdown equivalent, rendered as `<sup>`.
    Superscript,
    /// `` `inline code` ``
    Code,
}

/// Panel flavor, including expand/collapse sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelKind {
    Info,
    Note,
    Warning,
    Tip,
    Panel,
    Expand,
}

impl PanelKind {
    /// Bold label used when rendering the panel as a blockquote.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Note => "Note",
            Self::Warning => "Warning",
            Self::Tip => "Tip",
            Self::Panel => "Panel",
            Self::Expand => "Details",
        }
    }
}

/// Where a link points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkTarget {
    /// External URL, passed through unchanged.
    External(String),
    /// Another page in the export, referenced by title.
    PageTitle(String),
    /// Another page in the export, referenced by id.
    PageId(String),
    /// An attachment file.
    Attachment(String),
}

/// Where an image comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// Attachment filename within the export.
    Attachment(String),
    /// External or already-relative URL, passed through.
    External(String),
}

/// One item of a task list.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskItem {
    /// Whether the task is marked complete.
    pub checked: bool,
    /// Item content.
    pub children: Vec<MarkupNode>,
}

/// A parsed markup element.
///
/// Every variant carrying children owns an ordered sequence of nodes; the
/// structure is a strict tree (no sharing between parents).
#[derive(Clone, Debug, PartialEq)]
pub enum MarkupNode {
    /// Plain text run.
    Text(String),
    /// Heading with level 1-6.
    Heading { level: u8, children: Vec<MarkupNode> },
    /// Paragraph of inline content.
    Paragraph(Vec<MarkupNode>),
    /// Hard line break (`<br>`).
    LineBreak,
    /// Horizontal rule (`<hr>`).
    Rule,
    /// Ordered or unordered list; each item is an inline sequence.
    List {
        ordered: bool,
        items: Vec<Vec<MarkupNode>>,
    },
    /// Confluence task list.
    TaskList { items: Vec<TaskItem> },
    /// Table as rows of cells of inline content.
    Table {
        rows: Vec<Vec<Vec<MarkupNode>>>,
    },
    /// Fenced code block with optional language hint.
    CodeBlock {
        language: Option<String>,
        text: String,
    },
    /// Info/note/warning/tip/expand panel.
    Panel {
        kind: PanelKind,
        title: Option<String>,
        children: Vec<MarkupNode>,
    },
    /// Blockquote.
    Quote(Vec<MarkupNode>),
    /// Link with display content.
    Link {
        target: LinkTarget,
        children: Vec<MarkupNode>,
    },
    /// Image reference.
    Image { source: ImageSource, alt: String },
    /// Macro with no dedicated element; handled by policy.
    Macro { name: String, body: String },
    /// Inline formatting wrapper.
    Styled {
        style: TextStyle,
        children: Vec<MarkupNode>,
    },
}

/// Flatten a node sequence to its plain text content.
///
/// Used for heading paths, alt-text fallbacks, and table cells that hold
/// block content.
#[must_use]
pub fn plain_text(nodes: &[MarkupNode]) -> String {
    let mut out = String::new();
    collect_text(nodes, &mut out);
    out
}

fn collect_text(nodes: &[MarkupNode], out: &mut String) {
    for node in nodes {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::CodeBlock { text, .. } | MarkupNode::Macro { body: text, .. } => {
                out.push_str(text);
            }
            MarkupNode::Heading { children, .. }
            | MarkupNode::Paragraph(children)
            | MarkupNode::Quote(children)
            | MarkupNode::Panel { children, .. }
            | MarkupNode::Link { children, .. }
            | MarkupNode::Styled { children, .. } => collect_text(children, out),
            MarkupNode::List { items, .. } => {
                for item in items {
                    collect_text(item, out);
                }
            }
            MarkupNode::TaskList { items } => {
                for item in items {
                    collect_text(&item.children, out);
                }
            }
            MarkupNode::Table { rows } => {
                for row in rows {
                    for cell in row {
                        collect_text(cell, out);
                    }
                }
            }
            MarkupNode::Image { alt, .. } => out.push_str(alt),
            MarkupNode::LineBreak => out.push('\n'),
            MarkupNode::Rule => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_nested() {
        let nodes = vec![MarkupNode::Paragraph(vec![
            MarkupNode::Text("Hello ".to_owned()),
            MarkupNode::Styled {
                style: TextStyle::Bold,
                children: vec![MarkupNode::Text("World".to_owned())],
            },
        ])];
        assert_eq!(plain_text(&nodes), "Hello World");
    }

    #[test]
    fn test_panel_labels() {
        assert_eq!(PanelKind::Warning.label(), "Warning");
        assert_eq!(PanelKind::Expand.label(), "Details");
    }
}
