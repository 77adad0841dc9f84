//! Kernel package installation inside the chroot.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::packages::apt_update;
use super::SystemRoot;
use crate::disk::{unmount_all, Mount};

/// Host pseudo-filesystems apt and kernel postinst hooks expect.
/// Mounted in this order and unmounted in reverse.
const BIND_MOUNTS: &[&str] = &["/proc", "/sys", "/dev", "/dev/pts"];

/// Install `package` (e.g. linux-image-arm64) with apt inside the chroot.
pub fn install_kernel(root: &SystemRoot, package: &str) -> Result<()> {
    if !root.is_chroot() {
        bail!("Kernel installation is only done while building an image");
    }
    println!("Installing {}...", package);

    let mut mounts: Vec<Mount> = Vec::new();
    let result = bind_all(root, &mut mounts).and_then(|()| apt_install(root, package));

    // Unmount in reverse order even when apt failed.
    let unmount_result = unmount_all(mounts);

    result?;
    unmount_result.context("Bind mounts could not be released after kernel install")
}

fn bind_all(root: &SystemRoot, mounts: &mut Vec<Mount>) -> Result<()> {
    for dir in BIND_MOUNTS {
        let target = root.path(dir);
        fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        mounts.push(Mount::bind(Path::new(dir), &target)?);
    }
    Ok(())
}

fn apt_install(root: &SystemRoot, package: &str) -> Result<()> {
    apt_update(root)?;
    root.command("apt-get")
        .args(["install", "-y", package])
        .error_msg(format!("Failed to install {}", package))
        .run_interactive()?;
    Ok(())
}
