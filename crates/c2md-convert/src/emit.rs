//! Markdown rendering for the parsed markup tree.

use std::path::Path;

use c2md_config::{Settings, UnknownMacroPolicy};
use c2md_export::{Export, Page};
use c2md_markup::{ImageSource, LinkTarget, MarkupNode, TextStyle, plain_text};

use crate::paths::{PathMap, href, relative_path};

/// Renders one page's markup tree to Markdown.
///
/// Rendering never fails; problems surface as warnings and degrade to plain
/// text in place.
pub(crate) struct Renderer<'a> {
    page: &'a Page,
    export: &'a Export,
    paths: &'a PathMap,
    page_path: &'a Path,
    settings: &'a Settings,
    pub(crate) warnings: Vec<String>,
    pub(crate) unknown_macros: Vec<String>,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(
        page: &'a Page,
        export: &'a Export,
        paths: &'a PathMap,
        page_path: &'a Path,
        settings: &'a Settings,
    ) -> Self {
        Self {
            page,
            export,
            paths,
            page_path,
            settings,
            warnings: Vec::new(),
            unknown_macros: Vec::new(),
        }
    }

    /// Render a block sequence to a Markdown document body.
    pub(crate) fn render(&mut self, nodes: &[MarkupNode]) -> String {
        let blocks = self.blocks(nodes);
        let mut out = blocks.join("\n\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Render nodes into a list of Markdown blocks.
    ///
    /// Stray inline nodes at block level (text outside any paragraph) are
    /// grouped into implicit paragraphs.
    fn blocks(&mut self, nodes: &[MarkupNode]) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut pending_inline = String::new();

        for node in nodes {
            if is_inline(node) {
                self.inline_node(node, &mut pending_inline);
                continue;
            }
            flush_inline(&mut pending_inline, &mut blocks);
            if let Some(block) = self.block(node) {
                blocks.push(block);
            }
        }
        flush_inline(&mut pending_inline, &mut blocks);
        blocks
    }

    fn block(&mut self, node: &MarkupNode) -> Option<String> {
        match node {
            MarkupNode::Heading { level, children } => {
                let level = (*level).min(self.settings.output.max_heading_level);
                let text = self.inline(children);
                Some(format!("{} {}", "#".repeat(usize::from(level)), text.trim()))
            }
            MarkupNode::Paragraph(children) => {
                let text = self.inline(children);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_owned())
                }
            }
            MarkupNode::Rule => Some("---".to_owned()),
            MarkupNode::List { ordered, items } => {
                let mut out = String::new();
                self.list(*ordered, items, 0, &mut out);
                Some(out.trim_end().to_owned())
            }
            MarkupNode::TaskList { items } => {
                let mut out = String::new();
                for item in items {
                    let marker = if item.checked { "x" } else { " " };
                    let text = self.inline(&item.children);
                    out.push_str(&format!("- [{marker}] {}\n", text.trim()));
                }
                Some(out.trim_end().to_owned())
            }
            MarkupNode::Table { rows } => self.table(rows),
            MarkupNode::CodeBlock { language, text } => {
                Some(fenced_code(language.as_deref(), text))
            }
            MarkupNode::Panel {
                kind,
                title,
                children,
            } => {
                let label = match title {
                    Some(title) => format!("{}: {}", kind.label(), title),
                    None => kind.label().to_owned(),
                };
                let mut inner = vec![format!("**{label}**")];
                inner.extend(self.blocks(children));
                Some(quote_blocks(&inner))
            }
            MarkupNode::Quote(children) => {
                let inner = self.blocks(children);
                if inner.is_empty() {
                    None
                } else {
                    Some(quote_blocks(&inner))
                }
            }
            MarkupNode::Macro { name, body } => self.unknown_macro(name, body),
            // Inline nodes reaching here are handled by the caller's
            // paragraph grouping.
            _ => {
                let mut text = String::new();
                self.inline_node(node, &mut text);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_owned())
                }
            }
        }
    }

    fn list(
        &mut self,
        ordered: bool,
        items: &[Vec<MarkupNode>],
        depth: usize,
        out: &mut String,
    ) {
        let indent = "  ".repeat(depth);
        for (i, item) in items.iter().enumerate() {
            let marker = if ordered {
                format!("{}.", i + 1)
            } else {
                "-".to_owned()
            };

            let mut text = String::new();
            let mut nested: Vec<&MarkupNode> = Vec::new();
            for node in item {
                match node {
                    MarkupNode::List { .. } | MarkupNode::TaskList { .. } => {
                        nested.push(node);
                    }
                    MarkupNode::Paragraph(children) => {
                        if !text.is_empty() {
                            text.push(' ');
                        }
                        text.push_str(&self.inline(children));
                    }
                    node => self.inline_node(node, &mut text),
                }
            }
            out.push_str(&format!("{indent}{marker} {}\n", text.trim()));

            for node in nested {
                match node {
                    MarkupNode::List { ordered, items } => {
                        self.list(*ordered, items, depth + 1, out);
                    }
                    MarkupNode::TaskList { items } => {
                        let inner = "  ".repeat(depth + 1);
                        for item in items {
                            let marker = if item.checked { "x" } else { " " };
                            let text = self.inline(&item.children);
                            out.push_str(&format!("{inner}- [{marker}] {}\n", text.trim()));
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Render a table, padding short rows to the widest row.
    fn table(&mut self, rows: &[Vec<Vec<MarkupNode>>]) -> Option<String> {
        if rows.is_empty() {
            return None;
        }
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return None;
        }

        let mut rendered: Vec<Vec<String>> = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells: Vec<String> = row.iter().map(|cell| self.cell(cell)).collect();
            cells.resize(width, String::new());
            rendered.push(cells);
        }

        let mut out = String::new();
        for (i, cells) in rendered.iter().enumerate() {
            out.push_str("| ");
            out.push_str(&cells.join(" | "));
            out.push_str(" |\n");
            if i == 0 {
                out.push('|');
                for _ in 0..width {
                    out.push_str(" --- |");
                }
                out.push('\n');
            }
        }
        Some(out.trim_end().to_owned())
    }

    /// Render a table cell on a single line with pipes escaped.
    fn cell(&mut self, nodes: &[MarkupNode]) -> String {
        let text = self.inline(nodes);
        text.replace('\n', " ").replace('|', "\\|").trim().to_owned()
    }

    fn unknown_macro(&mut self, name: &str, body: &str) -> Option<String> {
        self.unknown_macros.push(name.to_owned());
        match self.settings.content.unknown_macros {
            UnknownMacroPolicy::Comment => {
                let mut out = format!("<!-- macro: {name} -->");
                if !body.trim().is_empty() {
                    out.push('\n');
                    out.push_str(body.trim());
                }
                Some(out)
            }
            UnknownMacroPolicy::Strip => None,
            UnknownMacroPolicy::PreserveText => {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_owned())
                }
            }
        }
    }

    fn inline(&mut self, nodes: &[MarkupNode]) -> String {
        let mut out = String::new();
        for node in nodes {
            self.inline_node(node, &mut out);
        }
        out
    }

    fn inline_node(&mut self, node: &MarkupNode, out: &mut String) {
        match node {
            MarkupNode::Text(text) => out.push_str(text),
            MarkupNode::LineBreak => out.push_str("  \n"),
            MarkupNode::Styled { style, children } => {
                let inner = self.inline(children);
                if inner.is_empty() {
                    return;
                }
                let (open, close) = match style {
                    TextStyle::Bold => ("**", "**"),
                    TextStyle::Italic => ("*", "*"),
                    TextStyle::Strike => ("~~", "~~"),
                    TextStyle::Underline => ("<u>", "</u>"),
                    TextStyle::Subscript => ("<sub>", "</sub>"),
                    TextStyle::Superscript => ("<sup>", "</sup>"),
                    TextStyle::Code => ("`", "`"),
                };
                out.push_str(open);
                out.push_str(&inner);
                out.push_str(close);
            }
            MarkupNode::Link { target, children } => self.link(target, children, out),
            MarkupNode::Image { source, alt } => self.image(source, alt, out),
            // Block content inside an inline position degrades to its text.
            node => out.push_str(&plain_text(std::slice::from_ref(node))),
        }
    }

    fn link(&mut self, target: &LinkTarget, children: &[MarkupNode], out: &mut String) {
        let text = {
            let rendered = self.inline(children);
            if rendered.trim().is_empty() {
                link_fallback_text(target)
            } else {
                rendered
            }
        };

        let url = match target {
            LinkTarget::External(url) => Some(url.clone()),
            LinkTarget::PageTitle(title) => {
                let id = self.export.page_by_title(title).map(|p| p.id.clone());
                match id.as_deref().and_then(|id| self.paths.get(id)) {
                    Some(path) => Some(href(&relative_path(self.page_path, path))),
                    None => {
                        self.warn_unresolved(&format!("page titled {title:?}"));
                        None
                    }
                }
            }
            LinkTarget::PageId(id) => match self.paths.get(id) {
                Some(path) => Some(href(&relative_path(self.page_path, path))),
                None => {
                    self.warn_unresolved(&format!("page id {id}"));
                    None
                }
            },
            LinkTarget::Attachment(name) => {
                if self.page.attachments.iter().any(|a| a.name == *name) {
                    Some(format!("attachments/{name}"))
                } else {
                    self.warn_unresolved(&format!("attachment {name:?}"));
                    None
                }
            }
        };

        match url {
            Some(url) => out.push_str(&format!("[{text}]({url})")),
            // Unresolved targets degrade to their display text.
            None => out.push_str(&text),
        }
    }

    fn image(&mut self, source: &ImageSource, alt: &str, out: &mut String) {
        match source {
            ImageSource::External(url) => {
                out.push_str(&format!("![{alt}]({url})"));
            }
            ImageSource::Attachment(name) => {
                if self.page.attachments.iter().any(|a| a.name == *name) {
                    out.push_str(&format!("![{alt}](attachments/{name})"));
                } else {
                    self.warn_unresolved(&format!("image attachment {name:?}"));
                    out.push_str(alt);
                }
            }
        }
    }

    fn warn_unresolved(&mut self, what: &str) {
        tracing::debug!(page = %self.page.title, "unresolved reference to {what}");
        self.warnings.push(format!("unresolved reference to {what}"));
    }
}

fn is_inline(node: &MarkupNode) -> bool {
    matches!(
        node,
        MarkupNode::Text(_)
            | MarkupNode::Styled { .. }
            | MarkupNode::Link { .. }
            | MarkupNode::Image { .. }
            | MarkupNode::LineBreak
    )
}

fn flush_inline(pending: &mut String, blocks: &mut Vec<String>) {
    let trimmed = pending.trim();
    if !trimmed.is_empty() {
        blocks.push(trimmed.to_owned());
    }
    pending.clear();
}

/// Prefix every line of the joined blocks with `> `.
fn quote_blocks(blocks: &[String]) -> String {
    let body = blocks.join("\n\n");
    body.lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_owned()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fence a code block, widening the fence when the body contains one.
fn fenced_code(language: Option<&str>, text: &str) -> String {
    let mut fence = "```".to_owned();
    while text.contains(&fence) {
        fence.push('`');
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    format!("{fence}{}\n{body}\n{fence}", language.unwrap_or(""))
}

fn link_fallback_text(target: &LinkTarget) -> String {
    match target {
        LinkTarget::External(url) => url.clone(),
        LinkTarget::PageTitle(title) => title.clone(),
        LinkTarget::PageId(id) => id.clone(),
        LinkTarget::Attachment(name) => name.clone(),
    }
}
