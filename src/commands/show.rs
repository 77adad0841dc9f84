//! Show command - displays information.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::create::absolute_image_path;
use crate::config::Config;
use crate::disk;
use crate::status::{self, Stage};

/// Show target for the show command.
pub enum ShowTarget {
    /// Show effective configuration
    Config,
    /// Show recorded build stages for an image
    Status { image: PathBuf },
}

/// Execute the show command.
pub fn cmd_show(base_dir: &Path, target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Status { image } => {
            let image = absolute_image_path(base_dir, &image);
            let path = status::status_path(&image);
            if !path.exists() {
                println!("No build status recorded for {}", image.display());
                return Ok(());
            }

            let status = status::load_status(&image);
            println!("Build status for {}:", image.display());
            match disk::image_size_mb(&image) {
                Ok(size) => println!("  {:<22} {} MB", "image size", size),
                Err(_) => println!("  {:<22} missing", "image size"),
            }
            for stage in [
                Stage::ImageCreated,
                Stage::Formatted,
                Stage::Bootstrapped,
                Stage::Configured,
            ] {
                let mark = if status.is_done(stage) { "done" } else { "pending" };
                println!("  {:<22} {}", stage.name(), mark);
            }
            if let Some(fp) = &status.bootstrap_fingerprint {
                let current = config.bootstrap_fingerprint();
                let note = if *fp == current {
                    "matches current config"
                } else {
                    "differs from current config, debootstrap will rerun"
                };
                println!("  bootstrap fingerprint  {} ({})", short_fingerprint(fp), note);
            }
            if status.finished() {
                println!("\nImage is complete. Re-running create only reapplies configuration.");
            }
        }
    }
    Ok(())
}

/// First 12 characters of a fingerprint, for display.
fn short_fingerprint(fp: &str) -> String {
    fp.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_fingerprint() {
        assert_eq!(short_fingerprint("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_fingerprint("abc"), "abc");
        // Hand-edited status files may hold anything.
        assert_eq!(short_fingerprint("ééééééééééééé"), "éééééééééééé");
    }
}
