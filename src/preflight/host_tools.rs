//! Host tool availability checks.

use crate::config::Config;
use crate::process;

use super::types::CheckResult;

/// (tool, package, purpose) for every tool `create` runs on the host.
const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("losetup", "util-linux", "Attaches the image to a loop device"),
    ("lsblk", "util-linux", "Reads partition UUIDs for fstab"),
    ("mount", "mount", "Mounts the image partitions"),
    ("umount", "mount", "Unmounts the image partitions"),
    ("parted", "parted", "Writes the partition table"),
    ("mkfs.vfat", "dosfstools", "Formats the boot partition"),
    ("mkfs.ext4", "e2fsprogs", "Formats the root partition"),
    ("chroot", "coreutils", "Configures the image's system"),
];

/// Check host tools are installed.
pub fn check_host_tools(config: &Config) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for (tool, package, purpose) in REQUIRED_TOOLS {
        results.push(check_tool_exists(tool, package, purpose, true));
    }

    // Either debootstrap flavour works.
    match process::which("qemu-debootstrap").or_else(|| process::which("debootstrap")) {
        Some(path) => results.push(CheckResult::pass_with("debootstrap", &path)),
        None => results.push(CheckResult::fail(
            "debootstrap",
            "Not found. Install 'debootstrap' package. Bootstraps the root filesystem",
        )),
    }

    results.push(check_tool_exists(
        "openssl",
        "openssl",
        "Hashes the root password",
        config.root_password.is_some(),
    ));
    results.push(check_tool_exists(
        "partx",
        "util-linux",
        "Re-reads partition tables when udev is slow",
        false,
    ));

    results
}

/// Check if a tool exists in PATH.
fn check_tool_exists(tool: &str, package: &str, purpose: &str, required: bool) -> CheckResult {
    match process::which(tool) {
        Some(path) => CheckResult::pass_with(tool, &path),
        None => {
            let msg = format!("Not found. Install '{}' package. {}", package, purpose);
            if required {
                CheckResult::fail(tool, &msg)
            } else {
                CheckResult::warn(tool, &msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preflight::types::CheckStatus;

    #[test]
    fn test_required_tools_list() {
        for (tool, package, purpose) in REQUIRED_TOOLS {
            assert!(!tool.is_empty());
            assert!(!package.is_empty());
            assert!(!purpose.is_empty());
        }
    }

    #[test]
    fn test_missing_tool_severity() {
        let required = check_tool_exists("nonexistent_tool_12345", "pkg", "why", true);
        assert_eq!(required.status, CheckStatus::Fail);
        assert!(required.details.unwrap().contains("Install 'pkg'"));

        let optional = check_tool_exists("nonexistent_tool_12345", "pkg", "why", false);
        assert_eq!(optional.status, CheckStatus::Warn);
    }

    #[test]
    fn test_present_tool_passes() {
        let result = check_tool_exists("sh", "dash", "shell", true);
        assert_eq!(result.status, CheckStatus::Pass);
    }
}
