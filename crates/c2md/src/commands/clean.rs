//! `c2md clean` command implementation.

use std::path::PathBuf;

use clap::Args;

use c2md_config::{CliSettings, Settings};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the clean command.
#[derive(Args)]
pub(crate) struct CleanArgs {
    /// Output directory to remove (overrides config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover c2md.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl CleanArgs {
    /// Execute the clean command.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            output_dir: self.output_dir.clone(),
            flat: None,
        };
        let settings = Settings::load(self.config.as_deref(), Some(&cli_settings))?;

        if c2md_build::clean(&settings.output.dir)? {
            output.success(&format!("Removed {}", settings.output.dir.display()));
        } else {
            output.info(&format!(
                "Nothing to clean: {} has no conversion state",
                settings.output.dir.display()
            ));
        }
        Ok(())
    }
}
