//! Mount guard.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// A mounted filesystem, unmounted on drop unless [`Mount::unmount`] ran.
#[derive(Debug)]
pub struct Mount {
    target: PathBuf,
    mounted: bool,
}

impl Mount {
    /// `mount <options> <source> <target>`.
    pub fn new(source: &Path, target: &Path, options: &[&str]) -> Result<Self> {
        println!("  Mounting {} on {}...", source.display(), target.display());
        Cmd::new("mount")
            .args(options)
            .arg_path(source)
            .arg_path(target)
            .error_msg(format!(
                "Failed to mount {} on {}",
                source.display(),
                target.display()
            ))
            .run()?;
        Ok(Self {
            target: target.to_path_buf(),
            mounted: true,
        })
    }

    /// Bind-mount a host directory into a chroot.
    pub fn bind(source: &Path, target: &Path) -> Result<Self> {
        Self::new(source, target, &["--bind"])
    }

    /// Unmount, reporting failure.
    pub fn unmount(mut self) -> Result<()> {
        self.mounted = false;
        println!("  Unmounting {}...", self.target.display());
        Cmd::new("umount")
            .arg_path(&self.target)
            .error_msg(format!("Failed to unmount {}", self.target.display()))
            .run()?;
        Ok(())
    }
}

/// Unmount in reverse acquisition order, returning the first failure.
///
/// Every mount is attempted even after a failure.
pub fn unmount_all(mut mounts: Vec<Mount>) -> Result<()> {
    let mut first_error = None;
    while let Some(mount) = mounts.pop() {
        if let Err(e) = mount.unmount() {
            eprintln!("  [WARN] {:#}", e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        if !self.mounted {
            return;
        }
        if let Err(e) = Cmd::new("umount").arg_path(&self.target).run() {
            // Busy mounts (e.g. a daemon started inside the chroot) still
            // need to go before the loop device can be detached.
            eprintln!(
                "  [WARN] Failed to unmount {}: {:#} (retrying lazily)",
                self.target.display(),
                e
            );
            if let Err(e) = Cmd::new("umount").arg("-l").arg_path(&self.target).run() {
                eprintln!(
                    "  [WARN] Lazy unmount of {} failed: {:#}",
                    self.target.display(),
                    e
                );
            }
        }
    }
}
