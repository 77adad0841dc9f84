//! Build environment checks (privileges, keyring, emulation, disk space).

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::process::Cmd;

use super::types::CheckResult;

/// True when running with uid 0.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// binfmt_misc entry that runs binaries of debootstrap arch `arch`, or
/// None when the host executes them natively.
pub fn qemu_binfmt_name(arch: &str, host_arch: &str) -> Option<&'static str> {
    let (name, native) = match arch {
        "arm64" => ("qemu-aarch64", "aarch64"),
        "armhf" | "armel" => ("qemu-arm", "arm"),
        "amd64" => ("qemu-x86_64", "x86_64"),
        "i386" => ("qemu-i386", "x86"),
        "riscv64" => ("qemu-riscv64", "riscv64"),
        _ => return None,
    };
    (host_arch != native).then_some(name)
}

/// Whether `dir` appears as a mount point in /proc/mounts-formatted content.
pub fn is_mount_point(mounts: &str, dir: &Path) -> bool {
    let dir = dir.to_string_lossy();
    let dir = dir.trim_end_matches('/');
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| target.trim_end_matches('/') == dir && !dir.is_empty())
}

/// Check the build environment for `create`.
pub fn check_build_environment(config: &Config, work_dir: &Path) -> Vec<CheckResult> {
    let mut results = Vec::new();

    if is_root() {
        results.push(CheckResult::pass("root privileges"));
    } else {
        results.push(CheckResult::fail(
            "root privileges",
            "Loop devices, mounts and chroot require root. Re-run with sudo.",
        ));
    }

    if config.keyring.exists() {
        results.push(CheckResult::pass_with(
            "archive keyring",
            &config.keyring.display().to_string(),
        ));
    } else {
        results.push(CheckResult::fail(
            "archive keyring",
            &format!(
                "{} not found. Install 'debian-archive-keyring' package.",
                config.keyring.display()
            ),
        ));
    }

    match qemu_binfmt_name(&config.arch, std::env::consts::ARCH) {
        None => results.push(CheckResult::pass_with(
            "binfmt emulation",
            &format!("{} runs natively", config.arch),
        )),
        Some(name) => {
            let entry = Path::new("/proc/sys/fs/binfmt_misc").join(name);
            if entry.exists() {
                results.push(CheckResult::pass_with("binfmt emulation", name));
            } else {
                results.push(CheckResult::fail(
                    "binfmt emulation",
                    &format!(
                        "{} not registered. Install 'qemu-user-static' and 'binfmt-support'.",
                        name
                    ),
                ));
            }
        }
    }

    match fs::read_to_string("/proc/mounts") {
        Ok(mounts) if is_mount_point(&mounts, &config.mount_dir) => {
            results.push(CheckResult::fail(
                "mount directory",
                &format!(
                    "{} is already a mount point. Unmount it or set RPI_MOUNT_DIR.",
                    config.mount_dir.display()
                ),
            ));
        }
        _ => results.push(CheckResult::pass_with(
            "mount directory",
            &config.mount_dir.display().to_string(),
        )),
    }

    // Check output directory is writable
    let test_file = work_dir.join(".rpi-imgbuild-preflight");
    match fs::write(&test_file, "test") {
        Ok(_) => {
            let _ = fs::remove_file(&test_file);
            results.push(CheckResult::pass("output directory writable"));
        }
        Err(e) => results.push(CheckResult::fail(
            "output directory writable",
            &format!("Cannot write to {}: {}", work_dir.display(), e),
        )),
    }

    // Use df to avoid a statvfs binding
    if let Ok(result) = Cmd::new("df")
        .args(["--output=avail", "-B1M"])
        .arg_path(work_dir)
        .allow_fail()
        .run()
    {
        if let Some(avail_mb) = result
            .stdout
            .lines()
            .nth(1)
            .and_then(|l| l.trim().trim_end_matches('M').parse::<u64>().ok())
        {
            if avail_mb < config.image_size_mb {
                results.push(CheckResult::fail(
                    "disk space",
                    &format!(
                        "{} MB free, image needs {} MB",
                        avail_mb, config.image_size_mb
                    ),
                ));
            } else {
                results.push(CheckResult::pass_with(
                    "disk space",
                    &format!("{} MB free", avail_mb),
                ));
            }
        }
    }

    results
}
