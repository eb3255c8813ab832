//! The page tree arena.
//!
//! Pages are stored in an id-indexed map with parent ids and ordered child
//! id lists, never as owning pointers. Traversal is pre-order over the
//! hierarchy as given by the export.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ExportError;

/// An attachment referenced by a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment filename as referenced from the page body.
    pub name: String,
    /// Resolved path of the file inside the extracted export, when found.
    pub source: Option<PathBuf>,
}

/// A single page extracted from an export.
#[derive(Clone, Debug)]
pub struct Page {
    /// Stable identifier from the export, or derived from the filename.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Containing page, `None` for top-level pages.
    pub parent_id: Option<String>,
    /// Child page ids in hierarchy order.
    pub children: Vec<String>,
    /// Unparsed markup body (storage format or HTML).
    pub raw_content: String,
    /// Attachments referenced by this page.
    pub attachments: Vec<Attachment>,
    /// Label names attached to the page (XML exports only).
    pub labels: Vec<String>,
    /// Distance from the root, 0 for top-level pages.
    pub depth: usize,
}

/// A parsed export: the full page collection plus root ordering.
///
/// Immutable after construction.
#[derive(Clone, Debug)]
pub struct Export {
    /// Source directory the export was read from.
    pub source: PathBuf,
    /// Space key, derived from the export or its directory name.
    pub space_key: String,
    pages: HashMap<String, Page>,
    roots: Vec<String>,
}

impl Export {
    /// Assemble an export from pages carrying `parent_id` links.
    ///
    /// `pages` must already be in hierarchy order (children follow their
    /// position in the export). Parents referenced but absent demote the
    /// page to a root with a warning; cycles are rejected.
    pub fn new(source: PathBuf, space_key: String, pages: Vec<Page>) -> Result<Self, ExportError> {
        let mut map: HashMap<String, Page> = HashMap::with_capacity(pages.len());
        let order: Vec<String> = pages.iter().map(|p| p.id.clone()).collect();
        for page in pages {
            map.insert(page.id.clone(), page);
        }

        // Link children in encounter order, demoting orphans to roots.
        let mut roots = Vec::new();
        for id in &order {
            let parent_id = map[id].parent_id.clone();
            match parent_id {
                Some(pid) if map.contains_key(&pid) => {
                    if let Some(parent) = map.get_mut(&pid) {
                        parent.children.push(id.clone());
                    }
                }
                Some(pid) => {
                    tracing::warn!("page {id} references missing parent {pid}, treating as root");
                    if let Some(page) = map.get_mut(id) {
                        page.parent_id = None;
                    }
                    roots.push(id.clone());
                }
                None => roots.push(id.clone()),
            }
        }

        // Depth computation doubles as cycle detection: a parent chain
        // longer than the page count can only mean a cycle.
        let mut depths: HashMap<String, usize> = HashMap::with_capacity(map.len());
        for id in &order {
            let mut depth = 0;
            let mut cursor = map[id].parent_id.clone();
            while let Some(pid) = cursor {
                depth += 1;
                if depth > map.len() {
                    return Err(ExportError::Format(format!(
                        "page hierarchy contains a cycle involving page {id}"
                    )));
                }
                cursor = map.get(&pid).and_then(|p| p.parent_id.clone());
            }
            depths.insert(id.clone(), depth);
        }
        for (id, depth) in depths {
            if let Some(page) = map.get_mut(&id) {
                page.depth = depth;
            }
        }

        Ok(Self {
            source,
            space_key,
            pages: map,
            roots,
        })
    }

    /// Look up a page by id.
    #[must_use]
    pub fn page(&self, id: &str) -> Option<&Page> {
        self.pages.get(id)
    }

    /// Look up a page by exact title.
    #[must_use]
    pub fn page_by_title(&self, title: &str) -> Option<&Page> {
        // Pre-order so a duplicate title resolves deterministically.
        self.pre_order().into_iter().find(|p| p.title == title)
    }

    /// Top-level page ids in export order.
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Number of pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the export holds no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// All pages in deterministic pre-order.
    #[must_use]
    pub fn pre_order(&self) -> Vec<&Page> {
        let mut out = Vec::with_capacity(self.pages.len());
        for root in &self.roots {
            self.visit(root, &mut out);
        }
        out
    }

    fn visit<'a>(&'a self, id: &str, out: &mut Vec<&'a Page>) {
        if let Some(page) = self.pages.get(id) {
            out.push(page);
            for child in &page.children {
                self.visit(child, out);
            }
        }
    }

    /// Slash-joined title path from the root to the page.
    #[must_use]
    pub fn title_path(&self, id: &str) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id.to_owned());
        while let Some(current) = cursor {
            let Some(page) = self.pages.get(&current) else {
                break;
            };
            parts.push(page.title.clone());
            cursor = page.parent_id.clone();
        }
        parts.reverse();
        parts.join("/")
    }

    /// Rebuild an export keeping only the given page ids.
    ///
    /// Used by page filtering; the original export is untouched. Child and
    /// root orderings are preserved.
    #[must_use]
    pub fn retain(&self, keep: &std::collections::HashSet<String>) -> Self {
        let pages = self
            .pages
            .iter()
            .filter(|(id, _)| keep.contains(*id))
            .map(|(id, page)| {
                let mut page = page.clone();
                page.children.retain(|c| keep.contains(c));
                (id.clone(), page)
            })
            .collect();
        let roots = self
            .roots
            .iter()
            .filter(|r| keep.contains(*r))
            .cloned()
            .collect();
        Self {
            source: self.source.clone(),
            space_key: self.space_key.clone(),
            pages,
            roots,
        }
    }
}

#[cfg(test)]
pub(crate) fn page(id: &str, title: &str, parent: Option<&str>) -> Page {
    Page {
        id: id.to_owned(),
        title: title.to_owned(),
        parent_id: parent.map(str::to_owned),
        children: Vec::new(),
        raw_content: String::new(),
        attachments: Vec::new(),
        labels: Vec::new(),
        depth: 0,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;

    fn export(pages: Vec<Page>) -> Export {
        Export::new(PathBuf::from("."), "TEST".to_owned(), pages).unwrap()
    }

    #[test]
    fn test_pre_order_follows_hierarchy() {
        let ex = export(vec![
            page("1", "Root", None),
            page("2", "Child A", Some("1")),
            page("4", "Grandchild", Some("2")),
            page("3", "Child B", Some("1")),
            page("5", "Second Root", None),
        ]);

        let order: Vec<&str> = ex.pre_order().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["1", "2", "4", "3", "5"]);
    }

    #[test]
    fn test_depth_computed() {
        let ex = export(vec![
            page("1", "Root", None),
            page("2", "Child", Some("1")),
            page("3", "Grandchild", Some("2")),
        ]);
        assert_eq!(ex.page("1").unwrap().depth, 0);
        assert_eq!(ex.page("3").unwrap().depth, 2);
    }

    #[test]
    fn test_title_path() {
        let ex = export(vec![
            page("1", "Root", None),
            page("2", "Child", Some("1")),
        ]);
        assert_eq!(ex.title_path("2"), "Root/Child");
        assert_eq!(ex.title_path("1"), "Root");
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let ex = export(vec![page("1", "Orphan", Some("999"))]);
        assert_eq!(ex.roots(), &["1".to_owned()]);
        assert_eq!(ex.page("1").unwrap().parent_id, None);
    }

    #[test]
    fn test_cycle_rejected() {
        let result = Export::new(
            PathBuf::from("."),
            "TEST".to_owned(),
            vec![page("1", "A", Some("2")), page("2", "B", Some("1"))],
        );
        assert!(matches!(result, Err(ExportError::Format(_))));
    }

    #[test]
    fn test_retain_prunes_subtree() {
        let ex = export(vec![
            page("1", "Root", None),
            page("2", "Keep", Some("1")),
            page("3", "Drop", Some("1")),
            page("4", "Drop Child", Some("3")),
        ]);
        let keep: HashSet<String> = ["1", "2"].iter().map(|s| (*s).to_owned()).collect();
        let pruned = ex.retain(&keep);

        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned.page("1").unwrap().children, vec!["2".to_owned()]);
        assert!(pruned.page("3").is_none());
        // Original untouched.
        assert_eq!(ex.len(), 4);
    }
}
