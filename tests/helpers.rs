//! Shared test utilities for rpi-imgbuild tests.

#![allow(dead_code)]

use rpi_imgbuild::system::SystemRoot;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test environment with a mock bootstrapped root filesystem.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock rootfs directory (stands in for the mounted image root)
    pub rootfs: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with a mock Debian tree.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let rootfs = temp_dir.path().join("rootfs");
        create_mock_rootfs(&rootfs);
        Self {
            _temp_dir: temp_dir,
            rootfs,
        }
    }

    /// The mock rootfs as a chroot target.
    pub fn system_root(&self) -> SystemRoot {
        SystemRoot::chroot(&self.rootfs)
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.rootfs.join(rel.trim_start_matches('/'))
    }
}

/// Create a minimal mock of what debootstrap leaves behind.
pub fn create_mock_rootfs(rootfs: &Path) {
    let dirs = [
        "usr/bin",
        "usr/lib",
        "etc/apt/apt.conf.d",
        "etc/default",
        "etc/ssh",
        "var/lib/dpkg",
    ];
    for dir in dirs {
        fs::create_dir_all(rootfs.join(dir)).expect("Failed to create mock rootfs dir");
    }

    fs::write(
        rootfs.join("etc/passwd"),
        "root:x:0:0:root:/root:/bin/bash\ndaemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin\n",
    )
    .expect("Failed to create passwd");
    fs::write(
        rootfs.join("etc/shadow"),
        "root:*:19000:0:99999:7:::\ndaemon:*:19000:0:99999:7:::\n",
    )
    .expect("Failed to create shadow");
    fs::write(
        rootfs.join("etc/ssh/sshd_config"),
        "Include /etc/ssh/sshd_config.d/*.conf\n#PermitRootLogin prohibit-password\nUsePAM yes\n",
    )
    .expect("Failed to create sshd_config");
    fs::write(rootfs.join("var/lib/dpkg/status"), "").expect("Failed to create dpkg status");
}

/// Assert that a file has exactly the expected content.
pub fn assert_file_eq(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert_eq!(content, expected, "Unexpected content in {}", path.display());
}

/// Assert that a file contains expected content.
pub fn assert_file_contains(path: &Path, expected: &str) {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert!(
        content.contains(expected),
        "File {} does not contain expected content.\nExpected to find: {}\nActual content: {}",
        path.display(),
        expected,
        content
    );
}
