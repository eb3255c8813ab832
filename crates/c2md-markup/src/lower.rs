//! Lowering from the generic XML tree into the markup element model.
//!
//! Handles both plain HTML tags (`h1`..`h6`, `p`, `ul`, `table`, ...) and
//! the Confluence storage-format elements (`ac:structured-macro`,
//! `ac:link`, `ac:image`, `ac:task-list`). Unknown container tags are
//! transparent: their content is lowered in place.

use crate::node::{ImageSource, LinkTarget, MarkupNode, PanelKind, TaskItem, TextStyle};
use crate::xml::XmlNode;

/// Lower a parsed fragment root into a node sequence.
pub fn lower_fragment(root: &XmlNode) -> Vec<MarkupNode> {
    lower_content(root)
}

/// Lower the text and children of an element, preserving order.
fn lower_content(node: &XmlNode) -> Vec<MarkupNode> {
    let mut out = Vec::new();
    if !node.text.is_empty() {
        out.push(MarkupNode::Text(node.text.clone()));
    }
    for child in &node.children {
        out.extend(lower_element(child));
        if !child.tail.is_empty() {
            out.push(MarkupNode::Text(child.tail.clone()));
        }
    }
    out
}

/// Lower a single element. Most elements produce exactly one node;
/// transparent containers splice their content.
fn lower_element(node: &XmlNode) -> Vec<MarkupNode> {
    match node.tag.as_str() {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = node.tag.as_bytes()[1] - b'0';
            vec![MarkupNode::Heading {
                level,
                children: lower_content(node),
            }]
        }
        "p" => vec![MarkupNode::Paragraph(lower_content(node))],
        "br" => vec![MarkupNode::LineBreak],
        "hr" => vec![MarkupNode::Rule],
        "ul" => vec![lower_list(node, false)],
        "ol" => vec![lower_list(node, true)],
        "table" => vec![lower_table(node)],
        "pre" => vec![lower_pre(node)],
        "blockquote" => vec![MarkupNode::Quote(lower_content(node))],
        "a" => vec![lower_anchor(node)],
        "img" => vec![MarkupNode::Image {
            source: ImageSource::External(node.attr("src").unwrap_or_default().to_owned()),
            alt: node.attr("alt").unwrap_or_default().to_owned(),
        }],
        "strong" | "b" => vec![styled(TextStyle::Bold, node)],
        "em" | "i" => vec![styled(TextStyle::Italic, node)],
        "s" | "del" | "strike" => vec![styled(TextStyle::Strike, node)],
        "u" | "ins" => vec![styled(TextStyle::Underline, node)],
        "sub" => vec![styled(TextStyle::Subscript, node)],
        "sup" => vec![styled(TextStyle::Superscript, node)],
        "code" | "tt" => vec![styled(TextStyle::Code, node)],
        "ac:structured-macro" | "ac:macro" => vec![lower_macro(node)],
        "ac:link" => vec![lower_ac_link(node)],
        "ac:image" => vec![lower_ac_image(node)],
        "ac:task-list" => vec![lower_task_list(node)],
        // Editor chrome with no content value.
        "script" | "style" | "head" | "ac:placeholder" => Vec::new(),
        // Everything else (div, span, body, tbody, ...) is transparent.
        _ => lower_content(node),
    }
}

fn styled(style: TextStyle, node: &XmlNode) -> MarkupNode {
    MarkupNode::Styled {
        style,
        children: lower_content(node),
    }
}

fn lower_list(node: &XmlNode, ordered: bool) -> MarkupNode {
    let items = node
        .children
        .iter()
        .filter(|c| c.tag == "li")
        .map(lower_content)
        .collect();
    MarkupNode::List { ordered, items }
}

fn lower_table(node: &XmlNode) -> MarkupNode {
    let mut rows = Vec::new();
    collect_rows(node, &mut rows);
    MarkupNode::Table { rows }
}

/// Collect `tr` rows, descending through `thead`/`tbody`/`tfoot`.
fn collect_rows(node: &XmlNode, rows: &mut Vec<Vec<Vec<MarkupNode>>>) {
    for child in &node.children {
        match child.tag.as_str() {
            "tr" => {
                let cells = child
                    .children
                    .iter()
                    .filter(|c| c.tag == "td" || c.tag == "th")
                    .map(lower_content)
                    .collect();
                rows.push(cells);
            }
            "thead" | "tbody" | "tfoot" | "colgroup" => collect_rows(child, rows),
            _ => {}
        }
    }
}

fn lower_pre(node: &XmlNode) -> MarkupNode {
    // <pre><code class="language-x">...</code></pre> or bare <pre>.
    let (language, text) = match node.child("code") {
        Some(code) => (
            code.attr("class")
                .and_then(|c| c.strip_prefix("language-"))
                .map(str::to_owned),
            code.deep_text(),
        ),
        None => (None, node.deep_text()),
    };
    MarkupNode::CodeBlock {
        language,
        text: text.trim_matches('\n').to_owned(),
    }
}

fn lower_anchor(node: &XmlNode) -> MarkupNode {
    let children = lower_content(node);
    match node.attr("href") {
        Some(href) if !href.is_empty() => MarkupNode::Link {
            target: LinkTarget::External(href.to_owned()),
            children,
        },
        // Anchor without target degrades to its content.
        _ => MarkupNode::Paragraph(children),
    }
}

/// Lower `ac:structured-macro` by macro name.
fn lower_macro(node: &XmlNode) -> MarkupNode {
    let name = node.attr("ac:name").unwrap_or("unknown").to_owned();

    match name.as_str() {
        "code" => MarkupNode::CodeBlock {
            language: macro_parameter(node, "language"),
            text: node
                .child("ac:plain-text-body")
                .map(XmlNode::deep_text)
                .unwrap_or_default()
                .trim_matches('\n')
                .to_owned(),
        },
        "info" | "note" | "warning" | "tip" | "panel" | "expand" => {
            let kind = match name.as_str() {
                "info" => PanelKind::Info,
                "note" => PanelKind::Note,
                "warning" => PanelKind::Warning,
                "tip" => PanelKind::Tip,
                "expand" => PanelKind::Expand,
                _ => PanelKind::Panel,
            };
            let children = node
                .child("ac:rich-text-body")
                .map(lower_content)
                .unwrap_or_default();
            MarkupNode::Panel {
                kind,
                title: macro_parameter(node, "title"),
                children,
            }
        }
        _ => MarkupNode::Macro {
            body: macro_body_text(node),
            name,
        },
    }
}

/// Value of an `ac:parameter` child by name.
fn macro_parameter(node: &XmlNode, name: &str) -> Option<String> {
    node.children
        .iter()
        .find(|c| c.tag == "ac:parameter" && c.attr("ac:name") == Some(name))
        .map(XmlNode::deep_text)
        .filter(|v| !v.is_empty())
}

/// Raw inner text of a macro's body, for the unknown-macro policy.
fn macro_body_text(node: &XmlNode) -> String {
    node.child("ac:rich-text-body")
        .or_else(|| node.child("ac:plain-text-body"))
        .map(XmlNode::deep_text)
        .unwrap_or_default()
        .trim()
        .to_owned()
}

fn lower_ac_link(node: &XmlNode) -> MarkupNode {
    let body = node
        .child("ac:link-body")
        .map(lower_content)
        .or_else(|| {
            node.child("ac:plain-text-link-body")
                .map(|b| vec![MarkupNode::Text(b.deep_text())])
        })
        .unwrap_or_default();

    if let Some(page) = node.child("ri:page") {
        let title = page.attr("ri:content-title").unwrap_or_default().to_owned();
        let children = if body.is_empty() {
            vec![MarkupNode::Text(title.clone())]
        } else {
            body
        };
        return MarkupNode::Link {
            target: LinkTarget::PageTitle(title),
            children,
        };
    }
    if let Some(attachment) = node.child("ri:attachment") {
        let filename = attachment.attr("ri:filename").unwrap_or_default().to_owned();
        let children = if body.is_empty() {
            vec![MarkupNode::Text(filename.clone())]
        } else {
            body
        };
        return MarkupNode::Link {
            target: LinkTarget::Attachment(filename),
            children,
        };
    }
    if let Some(url) = node.child("ri:url") {
        let value = url.attr("ri:value").unwrap_or_default().to_owned();
        return MarkupNode::Link {
            target: LinkTarget::External(value),
            children: body,
        };
    }
    // Link with no resource identifier degrades to its body text.
    MarkupNode::Paragraph(body)
}

fn lower_ac_image(node: &XmlNode) -> MarkupNode {
    let alt = node.attr("ac:alt").unwrap_or_default().to_owned();
    let source = node.child("ri:attachment").map_or_else(
        || {
            ImageSource::External(
                node.child("ri:url")
                    .and_then(|u| u.attr("ri:value"))
                    .unwrap_or_default()
                    .to_owned(),
            )
        },
        |attachment| {
            ImageSource::Attachment(attachment.attr("ri:filename").unwrap_or_default().to_owned())
        },
    );
    MarkupNode::Image { source, alt }
}

fn lower_task_list(node: &XmlNode) -> MarkupNode {
    let items = node
        .children
        .iter()
        .filter(|c| c.tag == "ac:task")
        .map(|task| TaskItem {
            checked: task
                .child("ac:task-status")
                .is_some_and(|s| s.deep_text().trim() == "complete"),
            children: task
                .child("ac:task-body")
                .map(lower_content)
                .unwrap_or_default(),
        })
        .collect();
    MarkupNode::TaskList { items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::plain_text;
    use crate::xml::parse_tree;

    fn lower(input: &str) -> Vec<MarkupNode> {
        lower_fragment(&parse_tree(input).unwrap())
    }

    #[test]
    fn test_heading_levels() {
        let nodes = lower("<h2>Section</h2>");
        assert_eq!(
            nodes,
            vec![MarkupNode::Heading {
                level: 2,
                children: vec![MarkupNode::Text("Section".to_owned())]
            }]
        );
    }

    #[test]
    fn test_inline_styles() {
        let nodes = lower("<p><strong>a</strong><em>b</em><s>c</s></p>");
        let MarkupNode::Paragraph(inline) = &nodes[0] else {
            panic!("expected paragraph");
        };
        assert!(matches!(
            inline[0],
            MarkupNode::Styled { style: TextStyle::Bold, .. }
        ));
        assert!(matches!(
            inline[1],
            MarkupNode::Styled { style: TextStyle::Italic, .. }
        ));
        assert!(matches!(
            inline[2],
            MarkupNode::Styled { style: TextStyle::Strike, .. }
        ));
    }

    #[test]
    fn test_nested_list() {
        let nodes = lower("<ul><li>a<ul><li>b</li></ul></li><li>c</li></ul>");
        let MarkupNode::List { ordered, items } = &nodes[0] else {
            panic!("expected list");
        };
        assert!(!ordered);
        assert_eq!(items.len(), 2);
        // First item contains text plus a nested list.
        assert!(items[0]
            .iter()
            .any(|n| matches!(n, MarkupNode::List { .. })));
    }

    #[test]
    fn test_table_through_tbody() {
        let nodes = lower("<table><tbody><tr><th>H</th></tr><tr><td>C</td></tr></tbody></table>");
        let MarkupNode::Table { rows } = &nodes[0] else {
            panic!("expected table");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(plain_text(&rows[0][0]), "H");
    }

    #[test]
    fn test_pre_code_language() {
        let nodes = lower(r#"<pre><code class="language-python">print("hi")</code></pre>"#);
        assert_eq!(
            nodes[0],
            MarkupNode::CodeBlock {
                language: Some("python".to_owned()),
                text: "print(\"hi\")".to_owned()
            }
        );
    }

    #[test]
    fn test_code_macro() {
        let nodes = lower(concat!(
            r#"<ac:structured-macro ac:name="code">"#,
            r#"<ac:parameter ac:name="language">rust</ac:parameter>"#,
            "<ac:plain-text-body><![CDATA[fn main() {}]]></ac:plain-text-body>",
            "</ac:structured-macro>"
        ));
        assert_eq!(
            nodes[0],
            MarkupNode::CodeBlock {
                language: Some("rust".to_owned()),
                text: "fn main() {}".to_owned()
            }
        );
    }

    #[test]
    fn test_panel_macro() {
        let nodes = lower(concat!(
            r#"<ac:structured-macro ac:name="warning">"#,
            "<ac:rich-text-body><p>Careful</p></ac:rich-text-body>",
            "</ac:structured-macro>"
        ));
        let MarkupNode::Panel { kind, children, .. } = &nodes[0] else {
            panic!("expected panel");
        };
        assert_eq!(*kind, PanelKind::Warning);
        assert_eq!(plain_text(children), "Careful");
    }

    #[test]
    fn test_expand_macro_title() {
        let nodes = lower(concat!(
            r#"<ac:structured-macro ac:name="expand">"#,
            r#"<ac:parameter ac:name="title">More info</ac:parameter>"#,
            "<ac:rich-text-body><p>Hidden</p></ac:rich-text-body>",
            "</ac:structured-macro>"
        ));
        let MarkupNode::Panel { kind, title, .. } = &nodes[0] else {
            panic!("expected panel");
        };
        assert_eq!(*kind, PanelKind::Expand);
        assert_eq!(title.as_deref(), Some("More info"));
    }

    #[test]
    fn test_unknown_macro() {
        let nodes = lower(concat!(
            r#"<ac:structured-macro ac:name="jira">"#,
            "<ac:plain-text-body>PROJ-123</ac:plain-text-body>",
            "</ac:structured-macro>"
        ));
        assert_eq!(
            nodes[0],
            MarkupNode::Macro {
                name: "jira".to_owned(),
                body: "PROJ-123".to_owned()
            }
        );
    }

    #[test]
    fn test_page_link() {
        let nodes = lower(concat!(
            r#"<ac:link><ri:page ri:content-title="Other Page" />"#,
            "<ac:plain-text-link-body><![CDATA[see here]]></ac:plain-text-link-body></ac:link>"
        ));
        assert_eq!(
            nodes[0],
            MarkupNode::Link {
                target: LinkTarget::PageTitle("Other Page".to_owned()),
                children: vec![MarkupNode::Text("see here".to_owned())]
            }
        );
    }

    #[test]
    fn test_page_link_without_body_uses_title() {
        let nodes = lower(r#"<ac:link><ri:page ri:content-title="Target" /></ac:link>"#);
        assert_eq!(
            nodes[0],
            MarkupNode::Link {
                target: LinkTarget::PageTitle("Target".to_owned()),
                children: vec![MarkupNode::Text("Target".to_owned())]
            }
        );
    }

    #[test]
    fn test_attachment_image() {
        let nodes = lower(
            r#"<ac:image ac:alt="diagram"><ri:attachment ri:filename="arch.png" /></ac:image>"#,
        );
        assert_eq!(
            nodes[0],
            MarkupNode::Image {
                source: ImageSource::Attachment("arch.png".to_owned()),
                alt: "diagram".to_owned()
            }
        );
    }

    #[test]
    fn test_task_list() {
        let nodes = lower(concat!(
            "<ac:task-list>",
            "<ac:task><ac:task-status>complete</ac:task-status>",
            "<ac:task-body>Done thing</ac:task-body></ac:task>",
            "<ac:task><ac:task-status>incomplete</ac:task-status>",
            "<ac:task-body>Open thing</ac:task-body></ac:task>",
            "</ac:task-list>"
        ));
        let MarkupNode::TaskList { items } = &nodes[0] else {
            panic!("expected task list");
        };
        assert!(items[0].checked);
        assert!(!items[1].checked);
        assert_eq!(plain_text(&items[1].children), "Open thing");
    }

    #[test]
    fn test_div_is_transparent() {
        let nodes = lower(r#"<div id="main-content"><p>Inner</p></div>"#);
        assert_eq!(nodes, vec![MarkupNode::Paragraph(vec![MarkupNode::Text("Inner".to_owned())])]);
    }
}
