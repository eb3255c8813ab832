//! Filename derivation from page titles.

use c2md_config::FilenameStyle;

/// Derive a filename stem from a page title.
#[must_use]
pub fn filename_stem(title: &str, style: FilenameStyle) -> String {
    match style {
        FilenameStyle::Slugify => slugify(title),
        FilenameStyle::Preserve => preserve(title),
    }
}

/// Lowercase, hyphen-separated slug.
///
/// Runs of non-alphanumeric characters collapse to a single hyphen; leading
/// and trailing hyphens are trimmed. A title with no usable characters
/// becomes `untitled`.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

/// Keep the title verbatim apart from filesystem-unsafe characters.
fn preserve(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("API Reference (v2)"), "api-reference-v2");
        assert_eq!(slugify("  Already--Slugged  "), "already-slugged");
    }

    #[test]
    fn test_slugify_unicode() {
        assert_eq!(slugify("Über Café"), "über-café");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("!!!"), "untitled");
        assert_eq!(slugify(""), "untitled");
    }

    #[test]
    fn test_preserve_replaces_unsafe() {
        assert_eq!(
            filename_stem("What: a/b?", FilenameStyle::Preserve),
            "What- a-b-"
        );
        assert_eq!(
            filename_stem("Plain Title", FilenameStyle::Preserve),
            "Plain Title"
        );
    }
}
