//! `c2md status` command implementation.

use std::path::PathBuf;

use clap::Args;

use c2md_config::{CliSettings, Settings};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the status command.
#[derive(Args)]
pub(crate) struct StatusArgs {
    /// Output directory to inspect (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover c2md.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl StatusArgs {
    /// Execute the status command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            output_dir: self.output_dir.clone(),
            flat: None,
        };
        let settings = Settings::load(self.config.as_deref(), Some(&cli_settings))?;

        let status = c2md_build::status(&settings.output.dir);
        output.highlight(&format!("Output: {}", status.output_dir.display()));
        if status.has_state {
            output.info(&format!("Pages recorded: {}", status.page_count));
            let current = settings.render_digest_input();
            let stale = status
                .settings_digest
                .as_deref()
                .is_some_and(|d| d != current);
            if stale {
                output.warning("Settings changed since the last run; next convert is full");
            } else {
                output.success("State is current with the active settings");
            }
        } else {
            output.info("No conversion state; next convert is full");
        }
        Ok(())
    }
}
