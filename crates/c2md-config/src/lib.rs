//! Configuration management for c2md.
//!
//! Parses `c2md.toml` settings files with serde and provides auto-discovery
//! of the config file in parent directories. CLI overrides can be applied
//! during load via [`CliSettings`].
//!
//! Settings split into three sections:
//!
//! - `[output]`: where and how Markdown files are written
//! - `[content]`: frontmatter and unknown-macro policy
//! - `[filter]`: page and section exclusion globs
//!
//! Only output-affecting fields participate in the cache digest (see
//! [`Settings::render_digest_input`]); the output directory itself does not.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "c2md.toml";

/// Error loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("failed to read settings file {path}")]
    Read {
        /// The file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid TOML.
    #[error("invalid settings file {path}: {message}")]
    Parse {
        /// The file that failed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// An exclusion glob does not compile.
    #[error("invalid exclusion pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// A field holds an out-of-range value.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the output directory.
    pub output_dir: Option<PathBuf>,
    /// Force a flat output tree regardless of config.
    pub flat: Option<bool>,
}

/// How output filenames are derived from page titles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameStyle {
    /// Lowercase, hyphen-separated slug.
    #[default]
    Slugify,
    /// Title used verbatim (unsafe characters replaced).
    Preserve,
}

/// What to emit for macros without a dedicated conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownMacroPolicy {
    /// An HTML comment naming the macro, followed by its text.
    #[default]
    Comment,
    /// Nothing.
    Strip,
    /// The macro's raw inner text, unformatted.
    PreserveText,
}

/// Output formatting settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output directory for generated Markdown.
    pub dir: PathBuf,
    /// Filename derivation style.
    pub filename_style: FilenameStyle,
    /// Mirror the page hierarchy as directories.
    pub preserve_hierarchy: bool,
    /// Clamp headings deeper than this level.
    pub max_heading_level: u8,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("exports"),
            filename_style: FilenameStyle::Slugify,
            preserve_hierarchy: true,
            max_heading_level: 6,
        }
    }
}

/// Content handling settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Prepend a YAML frontmatter block.
    pub include_frontmatter: bool,
    /// Fields to include in the frontmatter.
    pub frontmatter_fields: Vec<String>,
    /// Policy for macros without a dedicated conversion.
    pub unknown_macros: UnknownMacroPolicy,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            include_frontmatter: true,
            frontmatter_fields: vec!["title".to_owned()],
            unknown_macros: UnknownMacroPolicy::default(),
        }
    }
}

/// Exclusion settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Title-path globs; a match drops the page and its subtree.
    pub exclude_pages: Vec<String>,
    /// Heading-path globs; a match drops the section.
    pub exclude_sections: Vec<String>,
}

/// Immutable configuration snapshot for one run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output formatting.
    pub output: OutputSettings,
    /// Content handling.
    pub content: ContentSettings,
    /// Exclusions.
    pub filter: FilterSettings,
}

impl Settings {
    /// Load settings.
    ///
    /// When `path` is given it must exist; otherwise `c2md.toml` is searched
    /// from the current directory upward, falling back to defaults when no
    /// file is found. CLI overrides apply last, then the result is validated.
    pub fn load(
        path: Option<&Path>,
        cli: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => match discover_config() {
                Some(found) => Self::from_file(&found)?,
                None => Self::default(),
            },
        };

        if let Some(cli) = cli {
            if let Some(dir) = &cli.output_dir {
                settings.output.dir.clone_from(dir);
            }
            if let Some(flat) = cli.flat {
                settings.output.preserve_hierarchy = !flat;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=6).contains(&self.output.max_heading_level) {
            return Err(ConfigError::Invalid(format!(
                "output.max_heading_level must be 1-6, got {}",
                self.output.max_heading_level
            )));
        }
        for pattern in self
            .filter
            .exclude_pages
            .iter()
            .chain(&self.filter.exclude_sections)
        {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Canonical serialization of every output-affecting setting.
    ///
    /// Feeds the content-hash cache: any change here must reconvert every
    /// page. The output directory is deliberately absent (it does not
    /// change output bytes).
    #[must_use]
    pub fn render_digest_input(&self) -> String {
        #[derive(Serialize)]
        struct DigestInput<'a> {
            filename_style: FilenameStyle,
            preserve_hierarchy: bool,
            max_heading_level: u8,
            include_frontmatter: bool,
            frontmatter_fields: &'a [String],
            unknown_macros: UnknownMacroPolicy,
            exclude_pages: &'a [String],
            exclude_sections: &'a [String],
        }

        let input = DigestInput {
            filename_style: self.output.filename_style,
            preserve_hierarchy: self.output.preserve_hierarchy,
            max_heading_level: self.output.max_heading_level,
            include_frontmatter: self.content.include_frontmatter,
            frontmatter_fields: &self.content.frontmatter_fields,
            unknown_macros: self.content.unknown_macros,
            exclude_pages: &self.filter.exclude_pages,
            exclude_sections: &self.filter.exclude_sections,
        };
        serde_json::to_string(&input).expect("digest input serialization cannot fail")
    }
}

/// Search for `c2md.toml` from the current directory upward.
fn discover_config() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.output.dir, PathBuf::from("exports"));
        assert_eq!(settings.output.filename_style, FilenameStyle::Slugify);
        assert!(settings.output.preserve_hierarchy);
        assert_eq!(settings.output.max_heading_level, 6);
        assert!(settings.content.include_frontmatter);
        assert_eq!(settings.content.frontmatter_fields, vec!["title".to_owned()]);
        assert_eq!(settings.content.unknown_macros, UnknownMacroPolicy::Comment);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c2md.toml");
        fs::write(
            &path,
            r#"
[output]
dir = "out"
filename_style = "preserve"
max_heading_level = 3

[content]
include_frontmatter = false
unknown_macros = "strip"

[filter]
exclude_pages = ["Archive/**"]
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path), None).unwrap();
        assert_eq!(settings.output.dir, PathBuf::from("out"));
        assert_eq!(settings.output.filename_style, FilenameStyle::Preserve);
        assert_eq!(settings.output.max_heading_level, 3);
        assert!(!settings.content.include_frontmatter);
        assert_eq!(settings.content.unknown_macros, UnknownMacroPolicy::Strip);
        assert_eq!(settings.filter.exclude_pages, vec!["Archive/**".to_owned()]);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = CliSettings {
            output_dir: Some(PathBuf::from("elsewhere")),
            flat: Some(true),
        };
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c2md.toml");
        fs::write(&path, "").unwrap();

        let settings = Settings::load(Some(&path), Some(&cli)).unwrap();
        assert_eq!(settings.output.dir, PathBuf::from("elsewhere"));
        assert!(!settings.output.preserve_hierarchy);
    }

    #[test]
    fn test_invalid_heading_level_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c2md.toml");
        fs::write(&path, "[output]\nmax_heading_level = 9\n").unwrap();

        assert!(matches!(
            Settings::load(Some(&path), None),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("c2md.toml");
        fs::write(&path, "[filter]\nexclude_pages = [\"a[\"]\n").unwrap();

        assert!(matches!(
            Settings::load(Some(&path), None),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_digest_ignores_output_dir() {
        let mut a = Settings::default();
        let digest = a.render_digest_input();
        a.output.dir = PathBuf::from("somewhere-else");
        assert_eq!(digest, a.render_digest_input());

        a.output.max_heading_level = 3;
        assert_ne!(digest, a.render_digest_input());
    }
}
