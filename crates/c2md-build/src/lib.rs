//! Conversion orchestration.
//!
//! [`Builder::run`] drives a full export-to-Markdown build: parse the
//! export, apply page exclusions, assign output paths, convert pages in
//! parallel, and persist the incremental state. Per-page problems (markup
//! failures, write errors) are recorded in the [`BuildReport`] and never
//! abort the run; only a broken export, bad patterns, or an unwritable
//! output directory are fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use c2md_cache::{BuildCache, CacheError, page_hash};
use c2md_config::Settings;
use c2md_convert::{PathMap, convert_page};
use c2md_export::{Export, ExportError, Page};
use c2md_filter::{FilterError, PatternSet, filter_pages};

/// Fatal build failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The export could not be parsed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// An exclusion pattern does not compile.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The conversion state could not be persisted.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The output directory could not be prepared.
    #[error("failed to prepare output directory {path}")]
    OutputDir {
        /// The directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one page in the report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Page was converted and written.
    Converted,
    /// Page was up to date and left untouched.
    Skipped,
    /// Conversion or writing failed; see `error`.
    Failed,
}

/// Per-page entry of the build report.
#[derive(Clone, Debug, Serialize)]
pub struct PageReport {
    /// Page id from the export.
    pub page_id: String,
    /// Page title.
    pub title: String,
    /// Output path relative to the output directory.
    pub output_path: PathBuf,
    /// What happened to the page.
    pub status: PageStatus,
    /// Non-fatal conversion warnings.
    pub warnings: Vec<String>,
    /// Heading paths of sections dropped by exclusion globs.
    pub skipped_sections: Vec<String>,
    /// Failure message for [`PageStatus::Failed`].
    pub error: Option<String>,
    /// Wall time spent on this page.
    pub duration_ms: u64,
}

/// Result of a full build, ordered by output path.
#[derive(Debug, Serialize)]
pub struct BuildReport {
    /// Space key of the converted export.
    pub space_key: String,
    /// Number of pages converted this run.
    pub converted: usize,
    /// Number of up-to-date pages skipped.
    pub skipped: usize,
    /// Number of pages that failed.
    pub failed: usize,
    /// Total wall time of the run.
    pub elapsed_ms: u64,
    /// Per-page details, sorted by output path.
    pub pages: Vec<PageReport>,
}

impl BuildReport {
    /// Whether at least one page failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// A page due for conversion this run.
struct Job<'a> {
    page: &'a Page,
    output_path: &'a Path,
    content_hash: String,
}

/// What one conversion job produced.
struct JobOutcome {
    warnings: Vec<String>,
    skipped_sections: Vec<String>,
    error: Option<String>,
    duration_ms: u64,
}

/// Drives export parsing, conversion, and state persistence.
pub struct Builder {
    settings: Settings,
}

impl Builder {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Convert an extracted export directory into the output directory.
    ///
    /// With `force` every page is reconverted regardless of state.
    pub fn run(&self, export_path: &Path, force: bool) -> Result<BuildReport, BuildError> {
        let started = Instant::now();

        let export = c2md_export::parse(export_path)?;
        tracing::info!(
            space = %export.space_key,
            pages = export.len(),
            "parsed export {}",
            export_path.display()
        );

        let page_patterns = PatternSet::compile(&self.settings.filter.exclude_pages)?;
        let section_patterns = PatternSet::compile(&self.settings.filter.exclude_sections)?;
        let export = filter_pages(&export, &page_patterns);
        let paths = PathMap::build(&export, &self.settings);

        let output_dir = &self.settings.output.dir;
        fs::create_dir_all(output_dir).map_err(|source| BuildError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        let digest = self.settings.render_digest_input();
        let mut cache = BuildCache::load(output_dir, &digest);

        // Split pages into up-to-date and due-for-conversion up front so the
        // parallel phase shares only read-only data.
        let mut jobs: Vec<Job<'_>> = Vec::new();
        let mut skipped: Vec<&Page> = Vec::new();
        for page in export.pre_order() {
            let Some(output_path) = paths.get(&page.id) else {
                continue;
            };
            let content_hash = page_hash(&page.raw_content, &digest);
            if cache.should_convert(&page.id, &content_hash, force) {
                jobs.push(Job {
                    page,
                    output_path,
                    content_hash,
                });
            } else {
                skipped.push(page);
            }
        }

        let outcomes: Vec<JobOutcome> = jobs
            .par_iter()
            .map(|job| self.run_job(job, &export, &paths, &section_patterns, output_dir))
            .collect();

        let mut pages = Vec::with_capacity(export.len());
        for (job, outcome) in jobs.iter().zip(outcomes) {
            let status = if outcome.error.is_some() {
                PageStatus::Failed
            } else {
                cache.record(
                    &job.page.id,
                    &job.page.title,
                    job.output_path,
                    &job.content_hash,
                );
                PageStatus::Converted
            };
            pages.push(PageReport {
                page_id: job.page.id.clone(),
                title: job.page.title.clone(),
                output_path: job.output_path.to_path_buf(),
                status,
                warnings: outcome.warnings,
                skipped_sections: outcome.skipped_sections,
                error: outcome.error,
                duration_ms: outcome.duration_ms,
            });
        }
        for page in skipped {
            cache.carry_forward(&page.id);
            pages.push(PageReport {
                page_id: page.id.clone(),
                title: page.title.clone(),
                output_path: paths.get(&page.id).map(Path::to_path_buf).unwrap_or_default(),
                status: PageStatus::Skipped,
                warnings: Vec::new(),
                skipped_sections: Vec::new(),
                error: None,
                duration_ms: 0,
            });
        }
        pages.sort_by(|a, b| a.output_path.cmp(&b.output_path));

        cache.persist()?;

        let report = BuildReport {
            space_key: export.space_key.clone(),
            converted: pages
                .iter()
                .filter(|p| p.status == PageStatus::Converted)
                .count(),
            skipped: pages
                .iter()
                .filter(|p| p.status == PageStatus::Skipped)
                .count(),
            failed: pages
                .iter()
                .filter(|p| p.status == PageStatus::Failed)
                .count(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            pages,
        };
        tracing::info!(
            converted = report.converted,
            skipped = report.skipped,
            failed = report.failed,
            "build finished in {}ms",
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Convert one page and write its file and attachments.
    ///
    /// Failures land in the outcome; this never propagates an error so a
    /// bad page cannot take the run down.
    fn run_job(
        &self,
        job: &Job<'_>,
        export: &Export,
        paths: &PathMap,
        section_patterns: &PatternSet,
        output_dir: &Path,
    ) -> JobOutcome {
        let started = Instant::now();
        let conversion = convert_page(
            job.page,
            export,
            paths,
            job.output_path,
            &self.settings,
            section_patterns,
        );

        let error = write_page(job, &conversion.markdown, output_dir).err();
        JobOutcome {
            warnings: conversion.warnings,
            skipped_sections: conversion.skipped_sections,
            error,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Write the page file and copy its attachments next to it.
fn write_page(job: &Job<'_>, markdown: &str, output_dir: &Path) -> Result<(), String> {
    let file_path = output_dir.join(job.output_path);
    let parent = file_path.parent().unwrap_or(output_dir);
    fs::create_dir_all(parent)
        .map_err(|e| format!("creating {}: {e}", parent.display()))?;
    fs::write(&file_path, markdown)
        .map_err(|e| format!("writing {}: {e}", file_path.display()))?;

    let sources: Vec<_> = job
        .page
        .attachments
        .iter()
        .filter_map(|a| a.source.as_deref().map(|s| (a.name.as_str(), s)))
        .collect();
    if sources.is_empty() {
        return Ok(());
    }

    let attachments_dir = parent.join("attachments");
    fs::create_dir_all(&attachments_dir)
        .map_err(|e| format!("creating {}: {e}", attachments_dir.display()))?;
    for (name, source) in sources {
        let dest = attachments_dir.join(name);
        fs::copy(source, &dest)
            .map_err(|e| format!("copying attachment {name}: {e}"))?;
    }
    Ok(())
}

/// Summary of the conversion state in an output directory.
#[derive(Debug, Serialize)]
pub struct BuildStatus {
    /// Output directory the state belongs to.
    pub output_dir: PathBuf,
    /// Whether a state file is present and readable.
    pub has_state: bool,
    /// Settings digest the state was produced under.
    pub settings_digest: Option<String>,
    /// Number of pages recorded in the state.
    pub page_count: usize,
}

/// Inspect the conversion state without building.
#[must_use]
pub fn status(output_dir: &Path) -> BuildStatus {
    match c2md_cache::BuildCache::summary(output_dir) {
        Some(summary) => BuildStatus {
            output_dir: output_dir.to_path_buf(),
            has_state: true,
            settings_digest: Some(summary.settings_digest),
            page_count: summary.page_count,
        },
        None => BuildStatus {
            output_dir: output_dir.to_path_buf(),
            has_state: false,
            settings_digest: None,
            page_count: 0,
        },
    }
}

/// Remove a generated output directory.
///
/// Refuses to touch a directory without a state file, so a mistyped path
/// cannot delete unrelated files. Returns whether anything was removed.
pub fn clean(output_dir: &Path) -> Result<bool, std::io::Error> {
    if !output_dir.join(c2md_cache::STATE_FILENAME).is_file() {
        return Ok(false);
    }
    fs::remove_dir_all(output_dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENTITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hibernate-generic>
  <object class="Space" package="com.atlassian.confluence.spaces">
    <id name="id">100</id>
    <property name="key"><![CDATA[DOCS]]></property>
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
  <object class="BodyContent" package="com.atlassian.confluence.core">
    <id name="id">900</id>
    <property name="body"><![CDATA[<h1>Welcome</h1><p>Start here.</p>]]></property>
    <property name="content" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
  </object>
  <object class="BodyContent" package="com.atlassian.confluence.core">
    <id name="id">901</id>
    <property name="body"><![CDATA[<p>Guide body.</p>]]></property>
    <property name="content" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">2</id>
    </property>
  </object>
</hibernate-generic>"#;

    fn setup() -> (tempfile::TempDir, PathBuf, Settings) {
        let tmp = tempfile::TempDir::new().unwrap();
        let export_dir = tmp.path().join("export");
        fs::create_dir_all(&export_dir).unwrap();
        fs::write(export_dir.join("entities.xml"), ENTITIES).unwrap();

        let mut settings = Settings::default();
        settings.output.dir = tmp.path().join("out");
        (tmp, export_dir, settings)
    }

    #[test]
    fn test_first_run_converts_second_skips() {
        let (_tmp, export_dir, settings) = setup();
        let out_dir = settings.output.dir.clone();
        let builder = Builder::new(settings);

        let first = builder.run(&export_dir, false).unwrap();
        assert_eq!(first.converted, 2);
        assert_eq!(first.skipped, 0);
        assert_eq!(first.failed, 0);
        assert!(out_dir.join("home.md").is_file());
        assert!(out_dir.join("home/guide.md").is_file());

        let second = builder.run(&export_dir, false).unwrap();
        assert_eq!(second.converted, 0);
        assert_eq!(second.skipped, 2);
    }

    #[test]
    fn test_force_reconverts() {
        let (_tmp, export_dir, settings) = setup();
        let builder = Builder::new(settings);

        builder.run(&export_dir, false).unwrap();
        let forced = builder.run(&export_dir, true).unwrap();
        assert_eq!(forced.converted, 2);
        assert_eq!(forced.skipped, 0);
    }

    #[test]
    fn test_settings_change_reconverts() {
        let (_tmp, export_dir, mut settings) = setup();
        let builder = Builder::new(settings.clone());
        builder.run(&export_dir, false).unwrap();

        settings.output.max_heading_level = 3;
        let changed = Builder::new(settings).run(&export_dir, false).unwrap();
        assert_eq!(changed.converted, 2);
        assert_eq!(changed.skipped, 0);
    }

    #[test]
    fn test_deleted_output_reconverts() {
        let (_tmp, export_dir, settings) = setup();
        let out_dir = settings.output.dir.clone();
        let builder = Builder::new(settings);
        builder.run(&export_dir, false).unwrap();

        fs::remove_file(out_dir.join("home.md")).unwrap();
        let repaired = builder.run(&export_dir, false).unwrap();
        assert_eq!(repaired.converted, 1);
        assert_eq!(repaired.skipped, 1);
        assert!(out_dir.join("home.md").is_file());
    }

    #[test]
    fn test_excluded_subtree_not_written() {
        let (_tmp, export_dir, mut settings) = setup();
        settings.filter.exclude_pages = vec!["Home/Guide".to_owned()];
        let out_dir = settings.output.dir.clone();

        let report = Builder::new(settings).run(&export_dir, false).unwrap();
        assert_eq!(report.converted, 1);
        assert!(out_dir.join("home.md").is_file());
        assert!(!out_dir.join("home/guide.md").exists());
        assert!(report.pages.iter().all(|p| p.page_id != "2"));
    }

    #[test]
    fn test_write_failure_recorded_not_fatal() {
        let (_tmp, export_dir, settings) = setup();
        let out_dir = settings.output.dir.clone();

        // A directory squatting on the page's output path makes the write
        // fail for that page only.
        fs::create_dir_all(out_dir.join("home.md")).unwrap();

        let report = Builder::new(settings).run(&export_dir, false).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.converted, 1);
        assert!(report.has_failures());

        let failed = report
            .pages
            .iter()
            .find(|p| p.status == PageStatus::Failed)
            .unwrap();
        assert_eq!(failed.page_id, "1");
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_report_sorted_by_output_path() {
        let (_tmp, export_dir, settings) = setup();
        let report = Builder::new(settings).run(&export_dir, false).unwrap();
        let paths: Vec<_> = report.pages.iter().map(|p| p.output_path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_status_and_clean() {
        let (_tmp, export_dir, settings) = setup();
        let out_dir = settings.output.dir.clone();

        let before = status(&out_dir);
        assert!(!before.has_state);

        Builder::new(settings).run(&export_dir, false).unwrap();
        let after = status(&out_dir);
        assert!(after.has_state);
        assert_eq!(after.page_count, 2);

        assert!(clean(&out_dir).unwrap());
        assert!(!out_dir.exists());
        assert!(!clean(&out_dir).unwrap());
    }

    #[test]
    fn test_clean_refuses_foreign_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("precious.txt"), "data").unwrap();

        assert!(!clean(tmp.path()).unwrap());
        assert!(tmp.path().join("precious.txt").is_file());
    }

    #[test]
    fn test_attachments_copied() {
        let (_tmp, export_dir, settings) = setup();
        let out_dir = settings.output.dir.clone();

        // Attachment for page 1 under the export's attachments layout.
        let att_dir = export_dir.join("attachments/1/500");
        fs::create_dir_all(&att_dir).unwrap();
        fs::write(att_dir.join("1"), b"png bytes").unwrap();
        let with_attachment = ENTITIES.replace(
            "</hibernate-generic>",
            r#"  <object class="Attachment" package="com.atlassian.confluence.pages">
    <id name="id">500</id>
    <property name="title"><![CDATA[logo.png]]></property>
    <property name="containerContent" class="Page" package="com.atlassian.confluence.pages">
      <id name="id">1</id>
    </property>
  </object>
</hibernate-generic>"#,
        );
        fs::write(export_dir.join("entities.xml"), with_attachment).unwrap();

        Builder::new(settings).run(&export_dir, false).unwrap();
        assert_eq!(
            fs::read(out_dir.join("attachments/logo.png")).unwrap(),
            b"png bytes"
        );
    }
}
