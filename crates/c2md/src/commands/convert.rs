//! `c2md convert` command implementation.

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Args;

use c2md_build::Builder;
use c2md_config::{CliSettings, Settings};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the convert command.
#[derive(Args)]
pub(crate) struct ConvertArgs {
    /// Exported space: a directory or a .zip archive.
    export: PathBuf,

    /// Output directory for the Markdown tree (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Write every page into the output root, ignoring the hierarchy.
    #[arg(long)]
    flat: bool,

    /// Reconvert every page regardless of the incremental state.
    #[arg(short, long)]
    force: bool,

    /// Write the machine-readable build report as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover c2md.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable info-level logging.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl ConvertArgs {
    /// Execute the convert command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            output_dir: self.output_dir.clone(),
            flat: self.flat.then_some(true),
        };
        let settings = Settings::load(self.config.as_deref(), Some(&cli_settings))?;

        // ZIP exports are extracted to a temp dir that lives until the
        // build completes.
        let (export_dir, _extracted) = if is_zip(&self.export) {
            let extracted = extract_zip(&self.export)?;
            (export_root(extracted.path()), Some(extracted))
        } else {
            (self.export.clone(), None)
        };

        output.info(&format!("Export: {}", self.export.display()));
        output.info(&format!("Output: {}", settings.output.dir.display()));

        let report = Builder::new(settings).run(&export_dir, self.force)?;

        for page in &report.pages {
            for warning in &page.warnings {
                output.warning(&format!("{}: {warning}", page.output_path.display()));
            }
            if let Some(error) = &page.error {
                output.error(&format!("{}: {error}", page.output_path.display()));
            }
        }

        if let Some(path) = &self.report_json {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CliError::Validation(format!("serializing report: {e}")))?;
            std::fs::write(path, json)?;
        }

        let summary = format!(
            "Converted {} page(s), {} skipped, {} failed in {}ms",
            report.converted, report.skipped, report.failed, report.elapsed_ms
        );
        if report.has_failures() {
            output.warning(&summary);
            return Err(CliError::PagesFailed(report.failed));
        }
        output.success(&summary);
        Ok(())
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract a ZIP export into a fresh temp directory.
fn extract_zip(path: &Path) -> Result<tempfile::TempDir, CliError> {
    let dir = tempfile::TempDir::new()?;
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    archive.extract(dir.path())?;
    tracing::info!("extracted {} to {}", path.display(), dir.path().display());
    Ok(dir)
}

/// Resolve the export root inside an extracted archive.
///
/// Space exports often wrap everything in a single top-level directory;
/// descend into it when the root itself holds no export index.
fn export_root(extracted: &Path) -> PathBuf {
    if extracted.join("entities.xml").is_file() {
        return extracted.to_path_buf();
    }
    let entries: Vec<PathBuf> = std::fs::read_dir(extracted)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .collect();
    match entries.as_slice() {
        [single] if single.is_dir() => single.clone(),
        _ => extracted.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_is_zip_by_extension() {
        assert!(is_zip(Path::new("export.zip")));
        assert!(is_zip(Path::new("Export.ZIP")));
        assert!(!is_zip(Path::new("export")));
        assert!(!is_zip(Path::new("export.tar.gz")));
    }

    #[test]
    fn test_export_root_with_index_at_top() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("entities.xml"), "<hibernate-generic/>").unwrap();
        assert_eq!(export_root(tmp.path()), tmp.path());
    }

    #[test]
    fn test_export_root_descends_single_wrapper_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let inner = tmp.path().join("DOCS");
        fs::create_dir(&inner).unwrap();
        fs::write(inner.join("entities.xml"), "<hibernate-generic/>").unwrap();
        assert_eq!(export_root(tmp.path()), inner);
    }

    #[test]
    fn test_export_root_keeps_multi_entry_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        fs::create_dir(tmp.path().join("b")).unwrap();
        assert_eq!(export_root(tmp.path()), tmp.path());
    }
}
