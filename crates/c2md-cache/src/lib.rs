//! Incremental conversion state.
//!
//! The build writes a `.c2md-state.json` file into the output directory
//! recording, per page, the content hash of the last successful conversion.
//! On the next run a page whose hash is unchanged and whose output file
//! still exists is skipped.
//!
//! The hash covers the page's raw markup plus a digest of every
//! output-affecting setting, so a settings change invalidates every page
//! without any per-setting bookkeeping. A missing or corrupt state file is
//! never fatal; it simply means a full reconversion.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// State filename inside the output directory.
pub const STATE_FILENAME: &str = ".c2md-state.json";

/// Bumped whenever the state schema or hash recipe changes.
const STATE_VERSION: u32 = 1;

/// Error persisting the state file.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// State file could not be written.
    #[error("failed to write state file {path}")]
    Write {
        /// The file that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Record of one page's last successful conversion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Page title at conversion time.
    pub title: String,
    /// Output path relative to the output directory.
    pub output_path: PathBuf,
    /// Hex content hash the output was produced from.
    pub content_hash: String,
    /// Unix timestamp of the conversion.
    pub converted_at: u64,
}

/// On-disk state schema.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BuildState {
    version: u32,
    settings_digest: String,
    pages: HashMap<String, PageRecord>,
}

/// Summary of a persisted state file, for status display.
#[derive(Debug)]
pub struct StateSummary {
    /// Settings digest the state was produced under.
    pub settings_digest: String,
    /// Number of pages recorded.
    pub page_count: usize,
}

/// Conversion state for one output directory.
#[derive(Debug)]
pub struct BuildCache {
    output_dir: PathBuf,
    previous: BuildState,
    next: BuildState,
}

impl BuildCache {
    /// Load state from the output directory.
    ///
    /// Missing, unreadable, or schema-mismatched state degrades to an empty
    /// state with a warning; the run then reconverts everything.
    #[must_use]
    pub fn load(output_dir: &Path, settings_digest: &str) -> Self {
        let path = output_dir.join(STATE_FILENAME);
        let previous = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BuildState>(&content) {
                Ok(state) if state.version == STATE_VERSION => state,
                Ok(state) => {
                    tracing::debug!(
                        "state file schema version {} superseded, reconverting",
                        state.version
                    );
                    BuildState::default()
                }
                Err(e) => {
                    tracing::warn!("ignoring corrupt state file {}: {e}", path.display());
                    BuildState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BuildState::default(),
            Err(e) => {
                tracing::warn!("ignoring unreadable state file {}: {e}", path.display());
                BuildState::default()
            }
        };

        Self {
            output_dir: output_dir.to_path_buf(),
            previous,
            next: BuildState {
                version: STATE_VERSION,
                settings_digest: settings_digest.to_owned(),
                pages: HashMap::new(),
            },
        }
    }

    /// Whether a page must be reconverted.
    ///
    /// A page is skipped only when forcing is off, the stored hash matches,
    /// and its output file still exists on disk.
    #[must_use]
    pub fn should_convert(&self, page_id: &str, content_hash: &str, force: bool) -> bool {
        if force {
            return true;
        }
        let Some(record) = self.previous.pages.get(page_id) else {
            return true;
        };
        if record.content_hash != content_hash {
            return true;
        }
        !self.output_dir.join(&record.output_path).is_file()
    }

    /// Previous record for a page, if any.
    #[must_use]
    pub fn record_for(&self, page_id: &str) -> Option<&PageRecord> {
        self.previous.pages.get(page_id)
    }

    /// Record a successful conversion for the state written by [`persist`].
    ///
    /// Pages never recorded in a run fall out of the state, so deleted pages
    /// do not accumulate.
    ///
    /// [`persist`]: Self::persist
    pub fn record(&mut self, page_id: &str, title: &str, output_path: &Path, content_hash: &str) {
        self.next.pages.insert(
            page_id.to_owned(),
            PageRecord {
                title: title.to_owned(),
                output_path: output_path.to_path_buf(),
                content_hash: content_hash.to_owned(),
                converted_at: unix_now(),
            },
        );
    }

    /// Carry a skipped page's previous record forward unchanged.
    pub fn carry_forward(&mut self, page_id: &str) {
        if let Some(record) = self.previous.pages.get(page_id) {
            self.next.pages.insert(page_id.to_owned(), record.clone());
        }
    }

    /// Number of pages recorded for the next state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next.pages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.pages.is_empty()
    }

    /// Write the new state atomically (temp file then rename).
    pub fn persist(&self) -> Result<(), CacheError> {
        let path = self.output_dir.join(STATE_FILENAME);
        let write = |state: &BuildState| -> std::io::Result<()> {
            let json = serde_json::to_string_pretty(state)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&self.output_dir)?;
            tmp.write_all(json.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write(&self.next).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })
    }

    /// Summarize the persisted state without constructing a cache.
    ///
    /// Returns `None` when the state file is missing, unreadable, or from
    /// another schema version.
    #[must_use]
    pub fn summary(output_dir: &Path) -> Option<StateSummary> {
        let content = fs::read_to_string(output_dir.join(STATE_FILENAME)).ok()?;
        let state: BuildState = serde_json::from_str(&content).ok()?;
        (state.version == STATE_VERSION).then(|| StateSummary {
            settings_digest: state.settings_digest,
            page_count: state.pages.len(),
        })
    }

    /// Remove the state file if present.
    pub fn remove(output_dir: &Path) -> std::io::Result<()> {
        match fs::remove_file(output_dir.join(STATE_FILENAME)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Hex content hash of a page's raw markup under the given settings digest.
#[must_use]
pub fn page_hash(raw_content: &str, settings_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_content.as_bytes());
    hasher.update(settings_digest.as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_changes_with_content_and_settings() {
        let a = page_hash("<p>one</p>", "digest");
        assert_eq!(a, page_hash("<p>one</p>", "digest"));
        assert_ne!(a, page_hash("<p>two</p>", "digest"));
        assert_ne!(a, page_hash("<p>one</p>", "other-digest"));
    }

    #[test]
    fn test_fresh_cache_converts_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = BuildCache::load(tmp.path(), "digest");
        assert!(cache.should_convert("1", "abc", false));
    }

    #[test]
    fn test_skip_on_matching_hash_and_existing_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("home.md"), "x").unwrap();

        let mut cache = BuildCache::load(tmp.path(), "digest");
        cache.record("1", "Home", Path::new("home.md"), "abc");
        cache.persist().unwrap();

        let reloaded = BuildCache::load(tmp.path(), "digest");
        assert!(!reloaded.should_convert("1", "abc", false));
        assert!(reloaded.should_convert("1", "changed", false));
        assert!(reloaded.should_convert("1", "abc", true));
        assert!(reloaded.should_convert("2", "abc", false));
    }

    #[test]
    fn test_missing_output_forces_reconvert() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut cache = BuildCache::load(tmp.path(), "digest");
        cache.record("1", "Home", Path::new("home.md"), "abc");
        cache.persist().unwrap();

        let reloaded = BuildCache::load(tmp.path(), "digest");
        assert!(reloaded.should_convert("1", "abc", false));
    }

    #[test]
    fn test_corrupt_state_degrades_to_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join(STATE_FILENAME), "not json{").unwrap();

        let cache = BuildCache::load(tmp.path(), "digest");
        assert!(cache.should_convert("1", "abc", false));
    }

    #[test]
    fn test_unrecorded_pages_fall_out() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.md"), "x").unwrap();

        let mut cache = BuildCache::load(tmp.path(), "digest");
        cache.record("1", "Keep", Path::new("keep.md"), "aaa");
        cache.record("2", "Gone", Path::new("gone.md"), "bbb");
        cache.persist().unwrap();

        let mut second = BuildCache::load(tmp.path(), "digest");
        second.carry_forward("1");
        second.persist().unwrap();

        let third = BuildCache::load(tmp.path(), "digest");
        assert!(!third.should_convert("1", "aaa", false));
        assert!(third.should_convert("2", "bbb", false));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        BuildCache::remove(tmp.path()).unwrap();

        let cache = BuildCache::load(tmp.path(), "digest");
        cache.persist().unwrap();
        BuildCache::remove(tmp.path()).unwrap();
        BuildCache::remove(tmp.path()).unwrap();
        assert!(!tmp.path().join(STATE_FILENAME).exists());
    }
}
