//! Generic XML tree parsing over quick-xml events.
//!
//! Produces an element-tree representation close to the wire format: each
//! node keeps its tag, attributes, leading text, and the text that follows
//! it inside its parent (`tail`). The [`crate::lower`] stage turns this into
//! the markup element model.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::entities::normalize_entities;
use crate::error::MarkupError;

/// Confluence XML namespaces declared on the wrapper root.
const NAMESPACES: &[(&str, &str)] = &[
    ("ac", "http://www.atlassian.com/schema/confluence/4/ac/"),
    ("ri", "http://www.atlassian.com/schema/confluence/4/ri/"),
];

/// A generic parsed XML element.
///
/// `text` is the text immediately inside the opening tag; `tail` is the text
/// between this element's closing tag and the next sibling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Tag name with namespace prefix (e.g. `ac:structured-macro`).
    pub tag: String,
    /// Attributes with prefixed keys; namespace declarations are dropped.
    pub attrs: HashMap<String, String>,
    /// Leading text content.
    pub text: String,
    /// Text following this element inside its parent.
    pub tail: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Attribute lookup by prefixed name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// First child with the given tag.
    #[must_use]
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All text content of this element and its descendants, in order.
    #[must_use]
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            child.collect_text(out);
            out.push_str(&child.tail);
        }
    }
}

/// Parse a markup fragment into an [`XmlNode`] tree.
///
/// The fragment is wrapped in a synthetic root carrying the `ac:`/`ri:`
/// namespace declarations, so input does not need a single root element.
/// Named HTML entities are normalized to Unicode first.
pub fn parse_tree(fragment: &str) -> Result<XmlNode, MarkupError> {
    let normalized = normalize_entities(fragment);

    let decls = NAMESPACES
        .iter()
        .map(|(prefix, uri)| format!(r#"xmlns:{prefix}="{uri}""#))
        .collect::<Vec<_>>()
        .join(" ");
    let wrapped = format!("<c2md-root {decls}>{normalized}</c2md-root>");

    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    // Consume the wrapper's Start event, then read its children.
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => break,
            Event::Eof => return Ok(XmlNode::default()),
            _ => {}
        }
    }

    let mut root = read_children(&mut reader, "c2md-root")?;
    root.tag = "c2md-root".to_owned();
    Ok(root)
}

/// Read events until the end tag of `parent_tag`, accumulating children.
fn read_children<R: BufRead>(
    reader: &mut Reader<R>,
    parent_tag: &str,
) -> Result<XmlNode, MarkupError> {
    let mut buf = Vec::new();
    let mut node = XmlNode::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let tag = decode_name(reader, e.name().as_ref());
                let attrs = decode_attrs(reader, &e);
                let mut child = read_children(reader, &tag)?;
                child.tag = tag;
                child.attrs = attrs;
                node.children.push(child);
            }
            Event::Empty(e) => {
                node.children.push(XmlNode {
                    tag: decode_name(reader, e.name().as_ref()),
                    attrs: decode_attrs(reader, &e),
                    ..XmlNode::default()
                });
            }
            Event::Text(e) => {
                let text = reader.decoder().decode(&e)?.into_owned();
                push_text(&mut node, &text);
            }
            Event::GeneralRef(e) => {
                let entity = reader.decoder().decode(&e)?.into_owned();
                push_text(&mut node, &resolve_entity(&entity));
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_text(&mut node, &text);
            }
            Event::End(e) => {
                let tag = decode_name(reader, e.name().as_ref());
                if tag == parent_tag {
                    return Ok(node);
                }
                // Stray end tag from sloppy HTML; keep reading.
                tracing::trace!("ignoring mismatched end tag </{tag}> inside <{parent_tag}>");
            }
            Event::Eof => return Ok(node),
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }
}

/// Append text to the node's leading text or the last child's tail.
fn push_text(node: &mut XmlNode, text: &str) {
    if let Some(last) = node.children.last_mut() {
        last.tail.push_str(text);
    } else {
        node.text.push_str(text);
    }
}

fn decode_name<R: BufRead>(reader: &Reader<R>, name: &[u8]) -> String {
    reader.decoder().decode(name).map_or_else(
        |_| String::from_utf8_lossy(name).into_owned(),
        std::borrow::Cow::into_owned,
    )
}

fn decode_attrs<R: BufRead>(reader: &Reader<R>, e: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = reader.decoder().decode(attr.key.as_ref()).map_or_else(
            |_| String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            std::borrow::Cow::into_owned,
        );
        if key.starts_with("xmlns") {
            continue;
        }
        let value = attr.unescape_value().map_or_else(
            |_| String::from_utf8_lossy(&attr.value).into_owned(),
            std::borrow::Cow::into_owned,
        );
        attrs.insert(key, value);
    }
    attrs
}

/// Resolve a predefined or numeric entity reference.
fn resolve_entity(entity: &str) -> String {
    match entity {
        "lt" => "<".to_owned(),
        "gt" => ">".to_owned(),
        "amp" => "&".to_owned(),
        "apos" => "'".to_owned(),
        "quot" => "\"".to_owned(),
        s if s.starts_with('#') => {
            let code = if s[1..].starts_with('x') || s[1..].starts_with('X') {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map_or_else(|| format!("&{entity};"), |c| c.to_string())
        }
        _ => format!("&{entity};"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_element() {
        let tree = parse_tree("<p>Hello</p>").unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].tag, "p");
        assert_eq!(tree.children[0].text, "Hello");
    }

    #[test]
    fn test_nested_with_tail() {
        let tree = parse_tree("<p><strong>Bold</strong> text</p>").unwrap();
        let p = &tree.children[0];
        assert!(p.text.is_empty());
        let strong = &p.children[0];
        assert_eq!(strong.tag, "strong");
        assert_eq!(strong.text, "Bold");
        assert_eq!(strong.tail, " text");
    }

    #[test]
    fn test_self_closing() {
        let tree = parse_tree("<p>Before<br />After</p>").unwrap();
        let p = &tree.children[0];
        assert_eq!(p.text, "Before");
        assert_eq!(p.children[0].tag, "br");
        assert_eq!(p.children[0].tail, "After");
    }

    #[test]
    fn test_namespaced_attrs() {
        let tree = parse_tree(r#"<ac:image ac:alt="logo"><ri:attachment ri:filename="a.png" /></ac:image>"#)
            .unwrap();
        let image = &tree.children[0];
        assert_eq!(image.tag, "ac:image");
        assert_eq!(image.attr("ac:alt"), Some("logo"));
        assert_eq!(image.child("ri:attachment").unwrap().attr("ri:filename"), Some("a.png"));
    }

    #[test]
    fn test_cdata() {
        let tree =
            parse_tree("<ac:plain-text-body><![CDATA[a < b]]></ac:plain-text-body>").unwrap();
        assert_eq!(tree.children[0].text, "a < b");
    }

    #[test]
    fn test_numeric_entity() {
        let tree = parse_tree("<p>&#8594;&#x2192;</p>").unwrap();
        assert_eq!(tree.children[0].text, "\u{2192}\u{2192}");
    }

    #[test]
    fn test_deep_text() {
        let tree = parse_tree("<td>a <em>b</em> c</td>").unwrap();
        assert_eq!(tree.children[0].deep_text(), "a b c");
    }
}
