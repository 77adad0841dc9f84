//! MBR partitioning and filesystem creation for Raspberry Pi images.

use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::loop_device::partition_path;
use crate::process::Cmd;

/// FAT32 boot partition holding firmware, kernel and config.txt.
pub const BOOT_PARTITION: u32 = 1;
/// ext4 root partition.
pub const ROOT_PARTITION: u32 = 2;

/// Filesystems the Pi boot chain needs. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filesystem {
    Vfat,
    Ext4,
}

impl Filesystem {
    /// Name parted uses in `mkpart`.
    pub fn parted_type(self) -> &'static str {
        match self {
            Filesystem::Vfat => "fat32",
            Filesystem::Ext4 => "ext4",
        }
    }

    /// Name used by mkfs.<fs> and fstab.
    pub fn fs_type(self) -> &'static str {
        match self {
            Filesystem::Vfat => "vfat",
            Filesystem::Ext4 => "ext4",
        }
    }

    fn mkfs(self, device: &Path) -> Cmd {
        match self {
            Filesystem::Vfat => Cmd::new("mkfs.vfat")
                .args(["-F", "32", "-n", "BOOT"])
                .arg_path(device),
            Filesystem::Ext4 => Cmd::new("mkfs.ext4")
                .args(["-F", "-q", "-L", "rootfs"])
                .arg_path(device),
        }
    }
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fs_type())
    }
}

/// Build the parted invocations for the Pi layout.
///
/// Boot spans `0%..<boot_mb>M` (parted aligns the start), root takes the rest.
pub fn partition_commands(disk: &Path, boot_mb: u64) -> Vec<Cmd> {
    let boot_end = format!("{}M", boot_mb);
    vec![
        Cmd::new("parted")
            .arg("-s")
            .arg_path(disk)
            .args(["mklabel", "msdos"]),
        Cmd::new("parted")
            .args(["-s", "-a", "optimal"])
            .arg_path(disk)
            .args(["mkpart", "primary", Filesystem::Vfat.parted_type(), "0%"])
            .arg(&boot_end),
        Cmd::new("parted")
            .args(["-s", "-a", "optimal"])
            .arg_path(disk)
            .args(["mkpart", "primary", Filesystem::Ext4.parted_type()])
            .arg(&boot_end)
            .arg("100%"),
    ]
}

/// Write an msdos label with a FAT32 boot and an ext4 root partition.
pub fn partition_disk(disk: &Path, boot_mb: u64) -> Result<()> {
    for cmd in partition_commands(disk, boot_mb) {
        let desc = cmd.describe();
        cmd.error_msg(format!("Partitioning failed: {}", desc)).run()?;
    }
    Ok(())
}

/// Wait for the kernel to create the partition nodes after repartitioning.
pub fn wait_for_partitions(disk: &Path, count: u32) -> Result<Vec<PathBuf>> {
    let parts: Vec<PathBuf> = (1..=count).map(|n| partition_path(disk, n)).collect();

    for attempt in 0..20 {
        if parts.iter().all(|p| p.exists()) {
            return Ok(parts);
        }
        if attempt == 0 {
            // Ask the kernel to re-read the table in case udev is slow.
            let _ = Cmd::new("partx").arg("-u").arg_path(disk).allow_fail().run();
        }
        thread::sleep(Duration::from_millis(250));
    }

    let missing: Vec<String> = parts
        .iter()
        .filter(|p| !p.exists())
        .map(|p| p.display().to_string())
        .collect();
    bail!(
        "Partition devices did not appear: {}\n\
         Is the loop module loaded with partition support (max_part)?",
        missing.join(", ")
    );
}

/// Create `fs` on `device`.
pub fn format_partition(device: &Path, fs: Filesystem) -> Result<()> {
    println!("  mkfs.{} {}", fs, device.display());
    fs.mkfs(device)
        .error_msg(format!("mkfs.{} failed on {}", fs, device.display()))
        .run()?;
    Ok(())
}

/// Filesystem UUID of `device`, as reported by lsblk.
pub fn partition_uuid(device: &Path) -> Result<String> {
    let result = Cmd::new("lsblk")
        .arg_path(device)
        .args(["-n", "-o", "UUID"])
        .error_msg(format!("lsblk failed for {}", device.display()))
        .run()?;
    let uuid = result.stdout_trimmed();
    if uuid.is_empty() {
        bail!("{} has no filesystem UUID", device.display());
    }
    Ok(uuid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_commands_layout() {
        let cmds = partition_commands(Path::new("/dev/loop3"), 256);
        let lines: Vec<String> = cmds.iter().map(Cmd::describe).collect();

        assert_eq!(
            lines,
            vec![
                "parted -s /dev/loop3 mklabel msdos",
                "parted -s -a optimal /dev/loop3 mkpart primary fat32 0% 256M",
                "parted -s -a optimal /dev/loop3 mkpart primary ext4 256M 100%",
            ]
        );
    }

    #[test]
    fn test_mkfs_commands() {
        let vfat = Filesystem::Vfat.mkfs(Path::new("/dev/loop3p1"));
        assert_eq!(vfat.program(), "mkfs.vfat");
        assert!(vfat.get_args().contains(&"32".to_string()));

        let ext4 = Filesystem::Ext4.mkfs(Path::new("/dev/loop3p2"));
        assert_eq!(ext4.describe(), "mkfs.ext4 -F -q -L rootfs /dev/loop3p2");
    }
}
