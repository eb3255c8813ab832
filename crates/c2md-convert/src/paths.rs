//! Output path assignment and relative link computation.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use c2md_config::Settings;
use c2md_export::Export;

use crate::slug::filename_stem;

/// Relative output path for every page in an export.
///
/// Paths are assigned once, up front, so that every page can resolve links
/// to every other page regardless of conversion order. With hierarchy
/// preservation a parent page at `a.md` places its children under `a/`;
/// without it every page lands in the output root. Sibling pages whose
/// titles produce the same filename get `-2`, `-3` suffixes in tree order.
#[derive(Debug)]
pub struct PathMap {
    by_id: HashMap<String, PathBuf>,
}

impl PathMap {
    /// Assign an output path to every page of the export.
    #[must_use]
    pub fn build(export: &Export, settings: &Settings) -> Self {
        let mut by_id = HashMap::new();
        let mut used: HashMap<PathBuf, HashSet<String>> = HashMap::new();

        for page in export.pre_order() {
            let dir = if settings.output.preserve_hierarchy {
                page.parent_id
                    .as_deref()
                    .and_then(|parent| by_id.get(parent))
                    .map_or_else(PathBuf::new, |parent_path: &PathBuf| {
                        parent_path.with_extension("")
                    })
            } else {
                PathBuf::new()
            };

            let stem = filename_stem(&page.title, settings.output.filename_style);
            let taken = used.entry(dir.clone()).or_default();
            let mut unique = stem.clone();
            let mut n = 2;
            while !taken.insert(unique.clone()) {
                unique = format!("{stem}-{n}");
                n += 1;
            }

            by_id.insert(page.id.clone(), dir.join(format!("{unique}.md")));
        }

        Self { by_id }
    }

    /// Output path of a page, relative to the output root.
    #[must_use]
    pub fn get(&self, page_id: &str) -> Option<&Path> {
        self.by_id.get(page_id).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Relative path from the file `from` to the file `to`.
///
/// Both paths must be relative to the same root. The result walks up from
/// `from`'s directory with `..` segments as needed.
#[must_use]
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from_dir: Vec<Component<'_>> = from
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    let common = from_dir
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from_dir.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part);
    }
    rel
}

/// Render a relative path as a forward-slash link target.
#[must_use]
pub fn href(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
