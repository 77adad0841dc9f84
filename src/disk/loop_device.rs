//! Loop device attach/detach (losetup).

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Path of partition `number` on a partition-scanned block device.
///
/// Devices whose name ends in a digit (`/dev/loop0`, `/dev/mmcblk0`) use a
/// `p` separator; others (`/dev/sda`) do not.
pub fn partition_path(device: &Path, number: u32) -> PathBuf {
    let dev = device.to_string_lossy();
    if dev.ends_with(|c: char| c.is_ascii_digit()) {
        PathBuf::from(format!("{}p{}", dev, number))
    } else {
        PathBuf::from(format!("{}{}", dev, number))
    }
}

/// A loop device backed by an image file.
///
/// Detached on drop unless [`LoopDevice::detach`] was called.
#[derive(Debug)]
pub struct LoopDevice {
    path: PathBuf,
    attached: bool,
}

impl LoopDevice {
    /// Attach `image` to the first free loop device with partition scanning.
    pub fn attach(image: &Path) -> Result<Self> {
        let result = Cmd::new("losetup")
            .args(["-f", "-P", "--show"])
            .arg_path(image)
            .error_msg(format!("losetup failed for {}", image.display()))
            .run()?;

        let dev = result.stdout_trimmed();
        if !dev.starts_with("/dev/") {
            bail!("losetup returned unexpected device '{}'", dev);
        }

        println!("  Created loop device at {} for {}", dev, image.display());
        Ok(Self {
            path: PathBuf::from(dev),
            attached: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of partition `number` (1-based) on this device.
    pub fn partition(&self, number: u32) -> PathBuf {
        partition_path(&self.path, number)
    }

    /// Detach the loop device, reporting failure.
    pub fn detach(mut self) -> Result<()> {
        self.attached = false;
        println!("  Deleting loop device {}...", self.path.display());
        Cmd::new("losetup")
            .arg("-d")
            .arg_path(&self.path)
            .error_msg(format!("Failed to detach {}", self.path.display()))
            .run()?;
        Ok(())
    }
}

impl Drop for LoopDevice {
    fn drop(&mut self) {
        if !self.attached {
            return;
        }
        if let Err(e) = Cmd::new("losetup").arg("-d").arg_path(&self.path).run() {
            eprintln!(
                "  [WARN] Failed to detach {}: {:#}\n         Run 'losetup -d {}' manually.",
                self.path.display(),
                e,
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_path_loop() {
        assert_eq!(
            partition_path(Path::new("/dev/loop7"), 1),
            PathBuf::from("/dev/loop7p1")
        );
        assert_eq!(
            partition_path(Path::new("/dev/mmcblk0"), 2),
            PathBuf::from("/dev/mmcblk0p2")
        );
    }

    #[test]
    fn test_partition_path_sd() {
        assert_eq!(
            partition_path(Path::new("/dev/sdb"), 2),
            PathBuf::from("/dev/sdb2")
        );
    }
}
