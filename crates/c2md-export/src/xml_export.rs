//! XML space export reading (`entities.xml`).
//!
//! A Confluence XML export carries a single index file listing hibernate
//! objects. The reader extracts the subset that matters here:
//!
//! - `Space` objects for the space key
//! - `Page` objects: id, title, parent reference, position, status
//! - `BodyContent` objects: storage-format body plus owning page reference
//! - `Attachment` objects: filename plus owning page reference
//!
//! Historical versions (objects carrying an `originalVersion` reference)
//! and non-current pages are skipped.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ExportError;
use crate::tree::{Attachment, Export, Page};

/// One `<object>` record from the index.
#[derive(Debug, Default)]
struct RawObject {
    class: String,
    id: String,
    /// Text properties by name.
    props: HashMap<String, String>,
    /// Object-reference properties by name (value is the referenced id).
    refs: HashMap<String, String>,
}

pub(crate) fn parse(dir: &Path) -> Result<Export, ExportError> {
    let content = fs::read_to_string(dir.join("entities.xml"))?;
    let objects = read_objects(&content)?;

    let space_key = objects
        .iter()
        .find(|o| o.class == "Space")
        .and_then(|o| o.props.get("key").cloned())
        .unwrap_or_else(|| {
            dir.file_name()
                .map_or_else(|| "space".to_owned(), |n| n.to_string_lossy().into_owned())
        });

    // Storage-format bodies, keyed by owning page id.
    let mut bodies: HashMap<String, String> = HashMap::new();
    for obj in objects.iter().filter(|o| o.class == "BodyContent") {
        if let (Some(page_id), Some(body)) = (obj.refs.get("content"), obj.props.get("body")) {
            bodies.insert(page_id.clone(), body.clone());
        }
    }

    // Attachments, keyed by owning page id.
    let mut attachments: HashMap<String, Vec<Attachment>> = HashMap::new();
    for obj in objects.iter().filter(|o| o.class == "Attachment") {
        if obj.refs.contains_key("originalVersion") {
            continue;
        }
        let Some(page_id) = obj
            .refs
            .get("containerContent")
            .or_else(|| obj.refs.get("content"))
        else {
            continue;
        };
        let Some(name) = obj
            .props
            .get("title")
            .or_else(|| obj.props.get("fileName"))
        else {
            continue;
        };
        attachments.entry(page_id.clone()).or_default().push(Attachment {
            name: name.clone(),
            source: attachment_source(dir, page_id, &obj.id),
        });
    }

    // Labels joined onto pages through Labelling objects.
    let label_names: HashMap<&str, &str> = objects
        .iter()
        .filter(|o| o.class == "Label")
        .filter_map(|o| o.props.get("name").map(|n| (o.id.as_str(), n.as_str())))
        .collect();
    let mut labels: HashMap<String, Vec<String>> = HashMap::new();
    for obj in objects.iter().filter(|o| o.class == "Labelling") {
        let (Some(label_id), Some(page_id)) = (obj.refs.get("label"), obj.refs.get("content"))
        else {
            continue;
        };
        if let Some(name) = label_names.get(label_id.as_str()) {
            labels
                .entry(page_id.clone())
                .or_default()
                .push((*name).to_owned());
        }
    }

    // Current pages, ordered by (position, encounter order).
    let mut pages: Vec<(i64, usize, Page)> = Vec::new();
    for (index, obj) in objects.iter().filter(|o| o.class == "Page").enumerate() {
        if obj.refs.contains_key("originalVersion") {
            continue;
        }
        if obj
            .props
            .get("contentStatus")
            .is_some_and(|s| s != "current")
        {
            continue;
        }
        let Some(title) = obj.props.get("title") else {
            continue;
        };
        let position = obj
            .props
            .get("position")
            .and_then(|p| p.parse::<i64>().ok())
            .unwrap_or(i64::MAX);
        pages.push((
            position,
            index,
            Page {
                id: obj.id.clone(),
                title: title.clone(),
                parent_id: obj.refs.get("parent").cloned(),
                children: Vec::new(),
                raw_content: bodies.remove(&obj.id).unwrap_or_default(),
                attachments: attachments.remove(&obj.id).unwrap_or_default(),
                labels: labels.remove(&obj.id).unwrap_or_default(),
                depth: 0,
            },
        ));
    }

    if pages.is_empty() {
        return Err(ExportError::Format(format!(
            "no current pages found in {}",
            dir.join("entities.xml").display()
        )));
    }

    pages.sort_by_key(|(position, index, _)| (*position, *index));
    let pages = pages.into_iter().map(|(_, _, page)| page).collect();

    Export::new(dir.to_path_buf(), space_key, pages)
}

/// Locate an attachment's file under `attachments/<page>/<attachment>/`.
///
/// XML exports store one file per attachment version; the highest version
/// number wins. Missing files resolve to `None` (degraded at conversion).
fn attachment_source(dir: &Path, page_id: &str, attachment_id: &str) -> Option<std::path::PathBuf> {
    let base = dir.join("attachments").join(page_id).join(attachment_id);
    if base.is_file() {
        return Some(base);
    }
    let entries = fs::read_dir(&base).ok()?;
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .max_by_key(|p| {
            p.file_name()
                .and_then(|n| n.to_string_lossy().parse::<u64>().ok())
                .unwrap_or(0)
        })
}

/// Read all `<object>` records from the index document.
fn read_objects(content: &str) -> Result<Vec<RawObject>, ExportError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut objects = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"object" => {
                let class = attr(&e, b"class").unwrap_or_default();
                objects.push(read_object(&mut reader, class)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(objects)
}

fn read_object(reader: &mut Reader<&[u8]>, class: String) -> Result<RawObject, ExportError> {
    let mut obj = RawObject {
        class,
        ..RawObject::default()
    };
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"id" => obj.id = read_text(reader, b"id")?,
                b"property" => {
                    let name = attr(&e, b"name").unwrap_or_default();
                    let (text, reference) = read_property(reader)?;
                    if let Some(id) = reference {
                        obj.refs.insert(name, id);
                    } else {
                        obj.props.insert(name, text);
                    }
                }
                other => {
                    let tag = other.to_vec();
                    skip_element(reader, &tag)?;
                }
            },
            Event::End(e) if e.name().as_ref() == b"object" => return Ok(obj),
            Event::Eof => {
                return Err(ExportError::Format(
                    "unexpected end of entities.xml inside <object>".to_owned(),
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Read a `<property>` element: either text/CDATA content or a nested
/// `<id>` object reference.
fn read_property(reader: &mut Reader<&[u8]>) -> Result<(String, Option<String>), ExportError> {
    let mut text = String::new();
    let mut reference = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if e.name().as_ref() == b"id" {
                    reference = Some(read_text(reader, b"id")?);
                } else {
                    let tag = e.name().as_ref().to_vec();
                    skip_element(reader, &tag)?;
                }
            }
            Event::Text(e) => text.push_str(&reader.decoder().decode(&e)?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(_) => return Ok((text, reference)),
            Event::Eof => {
                return Err(ExportError::Format(
                    "unexpected end of entities.xml inside <property>".to_owned(),
                ));
            }
            _ => {}
        }
        buf.clear();
    }
}

/// Text content of the current element, consuming through its end tag.
fn read_text(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<String, ExportError> {
    let mut text = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&reader.decoder().decode(&e)?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(e) if e.name().as_ref() == tag => return Ok(text.trim().to_owned()),
            Event::Eof => return Ok(text.trim().to_owned()),
            _ => {}
        }
        buf.clear();
    }
}

/// Skip an element and all of its descendants.
fn skip_element(reader: &mut Reader<&[u8]>, tag: &[u8]) -> Result<(), ExportError> {
    let mut depth = 1usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == tag => depth += 1,
            Event::End(e) if e.name().as_ref() == tag => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => return Ok(()),
            _ => {}
        }
        buf.clear();
    }
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hibernate-generic datetime="2024-01-15 10:00:00">
  <object class="Space" package="com.atlassian.confluence.spaces">
    <id name="id">100</id>
    <property name="key"><![CDATA[DOCS]]></property>
    <property name="name"><![CDATA[Documentation]]></property>
  </object>
  <object class="Page" package="com.atlassian.confluence.pages">
    <id name="id">1</id>
    <property name="title"><![CDATA[Home]]></property>
    <property name="position">0</property>
    <property name="contentStatus"><![CDATA[current]]></property>
  </object>
  <object class="Page" package="com.atlassian.confluence.pages">
    <id name="id">2</id>
    <property name="title"><![CDATA[Guide]]></property>
    <property name="parent" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
    <property name="position">0</property>
    <property name="contentStatus"><![CDATA[current]]></property>
  </object>
  <object class="Page" package="com.atlassian.confluence.pages">
    <id name="id">3</id>
    <property name="title"><![CDATA[Old Guide]]></property>
    <property name="originalVersion" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">2</id>
    </property>
    <property name="contentStatus"><![CDATA[current]]></property>
  </object>
  <object class="BodyContent" package="com.atlassian.confluence.core">
    <id name="id">900</id>
    <property name="body"><![CDATA[<p>Welcome</p>]]></property>
    <property name="content" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
  </object>
  <object class="Label" package="com.atlassian.confluence.labels">
    <id name="id">700</id>
    <property name="name"><![CDATA[howto]]></property>
  </object>
  <object class="Labelling" package="com.atlassian.confluence.labels">
    <id name="id">701</id>
    <property name="label" class="Label" package="com.atlassian.confluence.labels">
      <id name="id">700</id>
    </property>
    <property name="content" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
  </object>
  <object class="Attachment" package="com.atlassian.confluence.pages">
    <id name="id">500</id>
    <property name="title"><![CDATA[logo.png]]></property>
    <property name="containerContent" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
  </object>
</hibernate-generic>"#;

    fn write_export(dir: &Path) {
        fs::write(dir.join("entities.xml"), ENTITIES).unwrap();
    }

    #[test]
    fn test_parses_pages_and_hierarchy() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_export(tmp.path());

        let export = parse(tmp.path()).unwrap();
        assert_eq!(export.space_key, "DOCS");
        assert_eq!(export.len(), 2);

        let home = export.page("1").unwrap();
        assert_eq!(home.title, "Home");
        assert_eq!(home.raw_content, "<p>Welcome</p>");
        assert_eq!(home.children, vec!["2".to_owned()]);
        assert_eq!(home.attachments[0].name, "logo.png");
        assert_eq!(home.labels, vec!["howto".to_owned()]);

        let guide = export.page("2").unwrap();
        assert_eq!(guide.parent_id.as_deref(), Some("1"));
        assert_eq!(guide.depth, 1);
    }

    #[test]
    fn test_historical_versions_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_export(tmp.path());

        let export = parse(tmp.path()).unwrap();
        assert!(export.page("3").is_none());
    }

    #[test]
    fn test_attachment_source_resolved() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_export(tmp.path());
        let att_dir = tmp.path().join("attachments/1/500");
        fs::create_dir_all(&att_dir).unwrap();
        fs::write(att_dir.join("1"), b"old").unwrap();
        fs::write(att_dir.join("2"), b"new").unwrap();

        let export = parse(tmp.path()).unwrap();
        let attachment = &export.page("1").unwrap().attachments[0];
        assert_eq!(attachment.source.as_deref(), Some(att_dir.join("2").as_path()));
    }

    #[test]
    fn test_empty_index_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(
            tmp.path().join("entities.xml"),
            "<hibernate-generic></hibernate-generic>",
        )
        .unwrap();
        assert!(matches!(
            parse(tmp.path()),
            Err(ExportError::Format(_))
        ));
    }
}
