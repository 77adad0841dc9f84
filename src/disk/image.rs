//! Image file allocation.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const MIB: u64 = 1024 * 1024;

/// Create an empty image file of `size_mb` MiB, replacing any existing file.
///
/// The file is allocated sparse; unwritten regions read back as zeros,
/// which is what a zero-filled `dd` image would contain.
pub fn create_image_file(path: &Path, size_mb: u64) -> Result<()> {
    if size_mb == 0 {
        bail!("Image size must be greater than 0 MB");
    }

    let size_bytes = match size_mb.checked_mul(MIB) {
        Some(bytes) => bytes,
        None => bail!("Image size {} MB is too large", size_mb),
    };

    if path.is_dir() {
        bail!("{} is a directory, expected an image file path", path.display());
    }

    if path.exists() {
        println!("  Removing existing {}", path.display());
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing image {}", path.display()))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create image file {}", path.display()))?;
    file.set_len(size_bytes)
        .with_context(|| format!("Failed to size image file {}", path.display()))?;

    println!(
        "  Created image file '{}' of size {} MB",
        path.display(),
        size_mb
    );
    Ok(())
}

/// Size of an existing image in MiB.
pub fn image_size_mb(path: &Path) -> Result<u64> {
    let meta =
        fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(meta.len() / MIB)
}
