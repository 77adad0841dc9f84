//! Cross-architecture root filesystem bootstrap.
//!
//! Needs debootstrap, debian-archive-keyring, qemu-user-static and
//! binfmt-support on the build host. Older debootstrap releases ship a
//! separate `qemu-debootstrap` wrapper; newer ones handle foreign
//! architectures directly, so whichever is installed is used.

use anyhow::{bail, Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::process::{self, Cmd};

/// A minbase arm64 tree with the default package set is well above this.
pub const MIN_ROOTFS_MB: u64 = 100;

/// Paths every bootstrapped Debian tree must contain.
const CRITICAL_PATHS: &[&str] = &[
    "usr/bin",
    "usr/lib",
    "etc/passwd",
    "etc/shadow",
    "etc/apt",
    "var/lib/dpkg/status",
];

/// Pick `qemu-debootstrap` when installed, plain `debootstrap` otherwise.
pub fn debootstrap_program() -> &'static str {
    if process::exists("qemu-debootstrap") {
        "qemu-debootstrap"
    } else {
        "debootstrap"
    }
}

/// Build the debootstrap command line for `target`.
pub fn bootstrap_command(program: &str, config: &Config, target: &Path) -> Cmd {
    let mut cmd = Cmd::new(program)
        .arg(format!("--arch={}", config.arch))
        .arg(format!("--keyring={}", config.keyring.display()))
        .arg(format!("--components={}", config.components.join(",")));
    if !config.packages.is_empty() {
        cmd = cmd.arg(format!("--include={}", config.packages.join(",")));
    }
    cmd.arg(format!("--variant={}", config.variant))
        .arg(&config.suite)
        .arg_path(target)
        .arg(&config.bootstrap_mirror)
}

/// Create a minimal Debian system at `target`.
pub fn debootstrap(config: &Config, target: &Path) -> Result<()> {
    process::ensure_exists(&config.keyring, "Debian archive keyring")
        .context("Install the debian-archive-keyring package")?;

    let cmd = bootstrap_command(debootstrap_program(), config, target);
    println!("  $ {}", cmd.describe());
    cmd.error_msg(format!("debootstrap into {} failed", target.display()))
        .run_interactive()?;

    validate_rootfs(target)?;
    Ok(())
}

/// Total size of regular files under `path`, in bytes.
///
/// Symlinks are not followed; a bootstrapped tree has absolute links into
/// `/` that would otherwise resolve to the build host.
pub fn dir_size(path: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Check that debootstrap produced a usable tree.
pub fn validate_rootfs(rootfs: &Path) -> Result<()> {
    for rel in CRITICAL_PATHS {
        let full = rootfs.join(rel);
        if !full.exists() {
            bail!(
                "Bootstrapped rootfs is incomplete: {} not found.\n\
                 Re-run with --fresh to bootstrap again.",
                full.display()
            );
        }
    }

    let size_mb = dir_size(rootfs)? / (1024 * 1024);
    if size_mb < MIN_ROOTFS_MB {
        bail!(
            "Bootstrapped rootfs seems too small ({} MB, expected at least {} MB).",
            size_mb,
            MIN_ROOTFS_MB
        );
    }

    println!("  [OK] Root filesystem: {} MB", size_mb);
    Ok(())
}
