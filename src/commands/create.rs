//! Create command - builds a Raspberry Pi disk image.
//!
//! Stages, in order:
//! 1. Allocate the image file
//! 2. Attach it to a loop device
//! 3. Partition (FAT32 boot + ext4 root) and format
//! 4. Mount root on the mount dir and boot on <mount dir>/boot/firmware
//! 5. debootstrap a minimal Debian system
//! 6. Configure the system inside a chroot
//! 7. Unmount boot, unmount root, detach the loop device
//!
//! Stages 1, 3, 5 and 6 are recorded in a status file next to the image so
//! a failed build resumes instead of starting over. The loop device and
//! mounts are guards: an error at any point releases them in reverse order.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::Config;
use crate::debootstrap;
use crate::disk::{
    self, Filesystem, LoopDevice, Mount, BOOT_PARTITION, ROOT_PARTITION,
};
use crate::preflight;
use crate::status::{self, BuildStatus, Stage};
use crate::system::{self, SystemRoot};
use crate::timing::Timer;

/// Mount options for the image partitions.
const MOUNT_OPTIONS: &[&str] = &["-o", "exec,dev"];

/// Options for the create command.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Image file to build.
    pub image: PathBuf,
    /// Ignore any recorded status and rebuild every stage.
    pub fresh: bool,
    /// Skip the preflight checks.
    pub skip_preflight: bool,
}

/// Resolve `image` against `base_dir` so status files compare stably.
///
/// The parent directory is canonicalized, so `pi.img` and `sub/../pi.img`
/// name the same build.
pub fn absolute_image_path(base_dir: &Path, image: &Path) -> PathBuf {
    let joined = if image.is_absolute() {
        image.to_path_buf()
    } else {
        base_dir.join(image)
    };
    status::canonical_image_path(&joined)
}

/// Decide which recorded stages can be trusted for this run.
pub fn reconcile_status(
    mut status: BuildStatus,
    image_exists: bool,
    fingerprint: &str,
) -> BuildStatus {
    if status.is_done(Stage::ImageCreated) && !image_exists {
        println!("  Image file is gone, starting over");
        status.invalidate_from(Stage::ImageCreated);
    }

    if status.is_done(Stage::Bootstrapped)
        && status.bootstrap_fingerprint.as_deref() != Some(fingerprint)
    {
        println!("  Bootstrap inputs changed since the last run, rebuilding root filesystem");
        status.invalidate_from(Stage::Bootstrapped);
    }

    // Configuration is cheap and idempotent; always reapply it.
    status.invalidate_from(Stage::Configured);
    status
}

/// Execute the create command.
pub fn cmd_create(base_dir: &Path, options: &CreateOptions, config: &Config) -> Result<()> {
    let image = absolute_image_path(base_dir, &options.image);
    let work_dir = image
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base_dir.to_path_buf());

    println!("=== Building Raspberry Pi image: {} ===\n", image.display());
    let build_start = Instant::now();

    if options.skip_preflight {
        preflight::require_root("rpi-imgbuild create")?;
    } else {
        fs::create_dir_all(&work_dir)
            .with_context(|| format!("Failed to create {}", work_dir.display()))?;
        preflight::run_preflight_or_fail(config, &work_dir)?;
    }

    let recorded = if options.fresh {
        BuildStatus::new(&image)
    } else {
        status::load_status(&image)
    };
    let mut status = reconcile_status(recorded, image.exists(), &config.bootstrap_fingerprint());

    let result = build_image(&image, config, &mut status);

    if let Err(e) = status::save_status(&image, &status) {
        eprintln!("  [WARN] {:#}", e);
    }

    match result {
        Ok(()) => {
            println!("\n=== Image Built ===");
            println!("  Output: {}", image.display());
            println!(
                "  Total time: {:.1}s",
                build_start.elapsed().as_secs_f64()
            );
            println!("\nTo flash:");
            println!(
                "  dd if={} of=/dev/<sdcard> bs=4M conv=fsync status=progress",
                image.display()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\n[!] Build failed. Completed stages are recorded; re-run to resume.");
            eprintln!(
                "    Status: {}",
                status::status_path(&image).display()
            );
            Err(e)
        }
    }
}

fn build_image(image: &Path, config: &Config, status: &mut BuildStatus) -> Result<()> {
    // 1. Image file
    if status.is_done(Stage::ImageCreated) {
        println!("{} already exists", image.display());
    } else {
        println!("Creating image file...");
        disk::create_image_file(image, config.image_size_mb)?;
        status.complete(Stage::ImageCreated);
    }

    // 2. Loop device, detached on drop if anything below fails
    println!("\nAttaching loop device...");
    let loop_dev = LoopDevice::attach(image)?;
    let boot_dev = loop_dev.partition(BOOT_PARTITION);
    let root_dev = loop_dev.partition(ROOT_PARTITION);

    // 3. Partitions
    if status.is_done(Stage::Formatted) {
        println!("\n{} is already formatted", loop_dev.path().display());
        disk::wait_for_partitions(loop_dev.path(), ROOT_PARTITION)?;
        if !status.is_done(Stage::Bootstrapped) {
            // A half-finished debootstrap leaves a tree it can't resume into.
            println!("Previous debootstrap did not finish, recreating root filesystem...");
            disk::format_partition(&root_dev, Filesystem::Ext4)?;
        }
    } else {
        let t = Timer::start("Partitioning");
        println!("\nFormatting {}...", loop_dev.path().display());
        disk::partition_disk(loop_dev.path(), config.boot_size_mb)?;
        disk::wait_for_partitions(loop_dev.path(), ROOT_PARTITION)?;
        disk::format_partition(&boot_dev, Filesystem::Vfat)?;
        disk::format_partition(&root_dev, Filesystem::Ext4)?;
        status.complete(Stage::Formatted);
        t.finish();
    }

    // 4. Mounts, released in reverse order on drop
    println!();
    fs::create_dir_all(&config.mount_dir)
        .with_context(|| format!("Failed to create {}", config.mount_dir.display()))?;
    let root_mount = Mount::new(&root_dev, &config.mount_dir, MOUNT_OPTIONS)?;
    let boot_dir = config.boot_mount_dir();
    fs::create_dir_all(&boot_dir)
        .with_context(|| format!("Failed to create {}", boot_dir.display()))?;
    let boot_mount = Mount::new(&boot_dev, &boot_dir, MOUNT_OPTIONS)?;

    // 5. debootstrap
    if status.is_done(Stage::Bootstrapped) {
        println!(
            "\ndebootstrap has already completed at {}",
            config.mount_dir.display()
        );
    } else {
        let t = Timer::start("debootstrap");
        println!(
            "\nCreating minimal Debian system at {}...",
            config.mount_dir.display()
        );
        debootstrap::debootstrap(config, &config.mount_dir)?;
        status.complete(Stage::Bootstrapped);
        status.bootstrap_fingerprint = Some(config.bootstrap_fingerprint());
        t.finish();
    }

    // 6. Configuration
    let t = Timer::start("Configuration");
    let root = SystemRoot::chroot(&config.mount_dir);
    configure_image(&root, config, &boot_dev, &root_dev)?;
    status.complete(Stage::Configured);
    t.finish();

    // 7. Teardown
    println!("\nReleasing image...");
    boot_mount.unmount()?;
    root_mount.unmount()?;
    loop_dev.detach()?;

    Ok(())
}

/// Apply the image's system configuration inside the chroot.
fn configure_image(
    root: &SystemRoot,
    config: &Config,
    boot_dev: &Path,
    root_dev: &Path,
) -> Result<()> {
    println!("\nConfiguring system...");
    system::configure_hostname(root, &config.hostname)?;
    system::configure_locale(root, &config.locale)?;
    system::configure_keyboard(root, &config.keyboard)?;
    system::configure_apt(root, &config.apt_mirror, &config.suite, &config.components)?;

    let boot_uuid = disk::partition_uuid(boot_dev)?;
    let root_uuid = disk::partition_uuid(root_dev)?;
    system::write_fstab(root, &boot_uuid, &root_uuid)?;

    system::configure_networking(root)?;
    system::configure_sshd(root)?;
    system::install_kernel(root, &config.kernel_package)?;

    match &config.root_password {
        Some(password) => system::change_root_password(root, password)?,
        None => println!("  Root password not set; root login stays locked"),
    }

    if config.vim_config {
        system::configure_vim(root)?;
    }

    println!("  [OK] System configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_status(fingerprint: &str) -> BuildStatus {
        let mut status = BuildStatus::new(Path::new("/tmp/pi.img"));
        for stage in [
            Stage::ImageCreated,
            Stage::Formatted,
            Stage::Bootstrapped,
            Stage::Configured,
        ] {
            status.complete(stage);
        }
        status.bootstrap_fingerprint = Some(fingerprint.to_string());
        status
    }

    #[test]
    fn test_absolute_image_path() {
        assert_eq!(
            absolute_image_path(Path::new("/work"), Path::new("pi.img")),
            PathBuf::from("/work/pi.img")
        );
        assert_eq!(
            absolute_image_path(Path::new("/work"), Path::new("/out/pi.img")),
            PathBuf::from("/out/pi.img")
        );
    }

    #[test]
    fn test_absolute_image_path_resolves_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let direct = absolute_image_path(dir.path(), Path::new("pi.img"));
        let via_sub = absolute_image_path(&dir.path().join("sub"), Path::new("../pi.img"));
        assert_eq!(direct, via_sub);
        assert_eq!(status::status_path(&direct), status::status_path(&via_sub));
    }

    #[test]
    fn test_reconcile_keeps_durable_stages() {
        let status = reconcile_status(finished_status("fp"), true, "fp");
        assert!(status.is_done(Stage::Formatted));
        assert!(status.is_done(Stage::Bootstrapped));
        assert!(!status.is_done(Stage::Configured));
    }

    #[test]
    fn test_reconcile_missing_image_starts_over() {
        let status = reconcile_status(finished_status("fp"), false, "fp");
        assert!(!status.is_done(Stage::ImageCreated));
        assert!(!status.is_done(Stage::Bootstrapped));
    }

    #[test]
    fn test_reconcile_changed_bootstrap_inputs() {
        let status = reconcile_status(finished_status("old"), true, "new");
        assert!(status.is_done(Stage::Formatted));
        assert!(!status.is_done(Stage::Bootstrapped));
        assert!(status.bootstrap_fingerprint.is_none());
    }
}
