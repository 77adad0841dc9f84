//! Clean command - releases and removes build leftovers.

use anyhow::Result;
use std::path::Path;

use super::create::absolute_image_path;
use crate::clean;

/// Execute the clean command.
pub fn cmd_clean(base_dir: &Path, image: &Path, remove_image: bool) -> Result<()> {
    let image = absolute_image_path(base_dir, image);
    println!("Cleaning up {}...", image.display());
    clean::clean_image(&image, remove_image)
}
