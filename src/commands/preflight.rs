//! Preflight command - runs preflight checks.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(base_dir: &Path, config: &Config, strict: bool) -> Result<()> {
    if strict {
        preflight::run_preflight_or_fail(config, base_dir)?;
    } else {
        let report = preflight::run_preflight(config, base_dir);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to exit non-zero.");
        }
    }
    Ok(())
}
