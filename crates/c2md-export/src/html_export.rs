//! HTML space export reading.
//!
//! HTML exports carry no structured index, so one page is inferred per
//! `.html` file. Titles come from `<title>` (with the ` - Space Name`
//! suffix stripped) or the first `<h1>`, bodies from the main-content
//! region, and ids from the trailing `_<digits>` Confluence puts in
//! filenames (falling back to a path hash). Hierarchy is flat unless
//! directory nesting with `index.html` anchors encodes it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExportError;
use crate::tree::{Attachment, Export, Page};

static TITLE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("invalid title regex"));
static H1_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("invalid h1 regex"));
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"));
static PAGE_ID_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d+)$").expect("invalid id regex"));
static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)src="([^"]+)""#).expect("invalid src regex"));

pub(crate) fn parse(dir: &Path) -> Result<Export, ExportError> {
    let mut files = Vec::new();
    collect_html_files(dir, &mut files)?;
    if files.is_empty() {
        return Err(ExportError::Format(format!(
            "no HTML files found in export: {}",
            dir.display()
        )));
    }
    files.sort();

    // First pass: build pages keyed by relative path.
    let mut pages: Vec<(PathBuf, Page)> = Vec::new();
    for file in &files {
        let relative = file.strip_prefix(dir).unwrap_or(file).to_path_buf();
        if let Some(page) = parse_html_file(dir, file, &relative) {
            pages.push((relative, page));
        }
    }
    if pages.is_empty() {
        return Err(ExportError::Format(format!(
            "no valid pages found in export: {}",
            dir.display()
        )));
    }

    // Directory nesting: an index.html anchors its directory; pages in
    // that directory become its children.
    let index_by_dir: HashMap<PathBuf, String> = pages
        .iter()
        .filter(|(relative, _)| relative.file_name().is_some_and(|n| n == "index.html"))
        .map(|(relative, page)| {
            (
                relative.parent().unwrap_or(Path::new("")).to_path_buf(),
                page.id.clone(),
            )
        })
        .collect();

    let pages = pages
        .into_iter()
        .map(|(relative, mut page)| {
            page.parent_id = parent_for(&relative, &page.id, &index_by_dir);
            page
        })
        .collect();

    let space_key = dir
        .file_name()
        .map_or_else(|| "space".to_owned(), |n| n.to_string_lossy().into_owned());

    Export::new(dir.to_path_buf(), space_key, pages)
}

/// Parent id from the nearest ancestor directory anchored by an index page.
fn parent_for(
    relative: &Path,
    page_id: &str,
    index_by_dir: &HashMap<PathBuf, String>,
) -> Option<String> {
    let is_index = relative.file_name().is_some_and(|n| n == "index.html");
    let mut dir = relative.parent()?;
    // An index page's parent lives one directory up.
    if is_index {
        dir = dir.parent()?;
    }
    loop {
        if let Some(id) = index_by_dir.get(dir) {
            if id != page_id {
                return Some(id.clone());
            }
        }
        dir = dir.parent()?;
    }
}

fn parse_html_file(export_root: &Path, file: &Path, relative: &Path) -> Option<Page> {
    let content = read_text_lossy(file)?;

    let body = content_region(&content);
    if strip_tags(body).trim().is_empty() {
        tracing::debug!("skipping {} (empty body)", relative.display());
        return None;
    }

    let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned())?;
    let title = extract_title(&content).unwrap_or_else(|| stem.clone());
    let id = PAGE_ID_SUFFIX
        .captures(&stem)
        .map_or_else(|| crate::path_id(relative), |caps| caps[1].to_owned());

    Some(Page {
        id,
        title,
        parent_id: None,
        children: Vec::new(),
        raw_content: body.to_owned(),
        attachments: attachment_refs(export_root, file, body),
        labels: Vec::new(),
        depth: 0,
    })
}

/// Read a file as UTF-8, falling back to Latin-1.
fn read_text_lossy(path: &Path) -> Option<String> {
    let bytes = fs::read(path).ok()?;
    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::debug!("{} is not UTF-8, decoding as Latin-1", path.display());
            Some(err.into_bytes().iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Extract the page title, cleaning the ` - Space Name` suffix Confluence
/// appends to `<title>`.
fn extract_title(content: &str) -> Option<String> {
    if let Some(caps) = TITLE_TAG.captures(content) {
        let raw = strip_tags(&caps[1]);
        let cleaned = raw.split(" - ").next().unwrap_or(&raw).trim();
        if !cleaned.is_empty() {
            return Some(cleaned.to_owned());
        }
    }
    if let Some(caps) = H1_TAG.captures(content) {
        let text = strip_tags(&caps[1]).trim().to_owned();
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

/// Best-effort main content region.
///
/// Prefers the `main-content`/`wiki-content` div Confluence exports use,
/// cut off before the footer; falls back to `<body>`, then the whole file.
fn content_region(content: &str) -> &str {
    for marker in [r#"id="main-content""#, r#"class="wiki-content""#] {
        if let Some(position) = content.find(marker) {
            let start = content[..position].rfind('<').unwrap_or(0);
            let rest = &content[start..];
            let end = rest
                .find(r#"<div id="footer""#)
                .or_else(|| rest.find("</body>"))
                .unwrap_or(rest.len());
            return &rest[..end];
        }
    }
    if let Some(start) = content.find("<body") {
        let start = content[start..]
            .find('>')
            .map_or(start, |offset| start + offset + 1);
        let end = content[start..]
            .find("</body>")
            .map_or(content.len(), |offset| start + offset);
        return &content[start..end];
    }
    content
}

fn strip_tags(fragment: &str) -> String {
    ANY_TAG.replace_all(fragment, "").into_owned()
}

/// Local image references in the body, resolved against the export tree.
fn attachment_refs(export_root: &Path, file: &Path, body: &str) -> Vec<Attachment> {
    let base = file.parent().unwrap_or(export_root);
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();
    for caps in IMG_SRC.captures_iter(body) {
        let src = &caps[1];
        if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:") {
            continue;
        }
        let Some(name) = src.rsplit('/').next().filter(|n| !n.is_empty()) else {
            continue;
        };
        if !seen.insert(name.to_owned()) {
            continue;
        }
        let resolved = base.join(src);
        refs.push(Attachment {
            name: name.to_owned(),
            source: resolved.is_file().then_some(resolved),
        });
    }
    refs
}

fn collect_html_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ExportError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_html_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            out.push(path);
        }
    }
    Ok(())
}
