//! Cleanup of image build leftovers.
//!
//! Releases loop devices and mounts still attached to an image (e.g. after
//! the build process was killed), and removes the status file and, on
//! request, the image itself.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Cmd;
use crate::status;

/// Loop devices listed by `losetup -j <image>`.
///
/// Lines look like `/dev/loop0: [2049]:1234 (/srv/pi.img)`.
pub fn parse_losetup_associations(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(dev, _)| dev.trim())
        .filter(|dev| dev.starts_with("/dev/"))
        .map(PathBuf::from)
        .collect()
}

/// Decode the octal escapes /proc/mounts uses for whitespace.
fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Mount points backed by `device` or its partitions, deepest first.
pub fn mounts_on_device(proc_mounts: &str, device: &Path) -> Vec<PathBuf> {
    let dev = device.to_string_lossy();
    let mut targets: Vec<PathBuf> = proc_mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let on_device = source == dev
                || source
                    .strip_prefix(dev.as_ref())
                    .is_some_and(|rest| rest.starts_with('p'));
            on_device.then(|| PathBuf::from(unescape_mount_path(target)))
        })
        .collect();
    targets.sort_by_key(|t| std::cmp::Reverse(t.components().count()));
    targets
}

/// Unmount and detach every loop device still attached to `image`.
///
/// Returns the number of loop devices released.
pub fn release_image(image: &Path) -> Result<usize> {
    let result = Cmd::new("losetup")
        .arg("-j")
        .arg_path(image)
        .error_msg(format!("losetup -j failed for {}", image.display()))
        .run()?;
    let devices = parse_losetup_associations(&result.stdout);
    if devices.is_empty() {
        return Ok(0);
    }

    let proc_mounts =
        fs::read_to_string("/proc/mounts").context("Failed to read /proc/mounts")?;

    for device in &devices {
        for target in mounts_on_device(&proc_mounts, device) {
            println!("  Unmounting {}...", target.display());
            Cmd::new("umount")
                .arg_path(&target)
                .error_msg(format!("Failed to unmount {}", target.display()))
                .run()?;
        }
        println!("  Detaching {}...", device.display());
        Cmd::new("losetup")
            .arg("-d")
            .arg_path(device)
            .error_msg(format!("Failed to detach {}", device.display()))
            .run()?;
    }

    Ok(devices.len())
}

/// Remove build state for `image`, optionally deleting the image too.
pub fn clean_image(image: &Path, remove_image: bool) -> Result<()> {
    if image.exists() {
        let released = release_image(image)?;
        if released > 0 {
            println!("Released {} loop device(s).", released);
        }
    }

    if status::remove_status(image)? {
        println!("Removed {}", status::status_path(image).display());
    }

    if remove_image && image.exists() {
        println!("Removing {}...", image.display());
        fs::remove_file(image)
            .with_context(|| format!("Failed to remove {}", image.display()))?;
    }

    println!("Clean complete.");
    Ok(())
}
