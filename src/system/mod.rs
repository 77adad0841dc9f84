//! Configuration of a Debian system, either inside a chroot during the
//! image build or directly on a booted device.
//!
//! Both cases go through [`SystemRoot`]: file paths are resolved under its
//! root and commands are wrapped in `chroot <root>` when needed.

mod etc;
mod kernel;
mod network;
mod openssh;
mod packages;
mod users;

pub use etc::{
    configure_apt, configure_hostname, configure_keyboard, configure_locale, configure_vim,
    fstab_content, hosts_content, keyboard_content, write_fstab, APT_NO_RECOMMENDS,
};
pub use kernel::install_kernel;
pub use network::{configure_networking, disable_legacy_networking, DHCP_NETWORK};
pub use openssh::{configure_sshd, permit_root_login};
pub use packages::{apt_clean, apt_update, autoremove, installed_packages, purge_packages};
pub use users::{change_root_password, hash_password, replace_root_hash};

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// The filesystem tree being configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRoot {
    root: PathBuf,
    chroot: bool,
}

impl SystemRoot {
    /// A tree mounted at `dir`; commands run via `chroot dir`.
    pub fn chroot(dir: impl Into<PathBuf>) -> Self {
        Self {
            root: dir.into(),
            chroot: true,
        }
    }

    /// The running system.
    pub fn live() -> Self {
        Self {
            root: PathBuf::from("/"),
            chroot: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_chroot(&self) -> bool {
        self.chroot
    }

    /// Resolve an absolute in-system path (`/etc/hostname`) under the root.
    pub fn path(&self, system_path: &str) -> PathBuf {
        self.root.join(system_path.trim_start_matches('/'))
    }

    /// Command running `program` inside the system.
    pub fn command(&self, program: &str) -> Cmd {
        if self.chroot {
            Cmd::new("chroot").arg_path(&self.root).arg(program)
        } else {
            Cmd::new(program)
        }
    }

    /// Write an in-system file, creating parent directories.
    pub fn write_file(&self, system_path: &str, content: &str) -> Result<()> {
        let path = self.path(system_path);
        println!("  Writing {}...", system_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Read an in-system file.
    pub fn read_file(&self, system_path: &str) -> Result<String> {
        let path = self.path(system_path);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// `systemctl enable <unit>` inside the system.
    pub fn enable_service(&self, unit: &str) -> Result<()> {
        println!("  Enabling {}...", unit);
        self.command("systemctl")
            .args(["enable", unit])
            .error_msg(format!("Failed to enable {}", unit))
            .run()?;
        Ok(())
    }

    /// `systemctl disable <unit>`, tolerating units that are not installed.
    pub fn disable_service(&self, unit: &str) -> Result<()> {
        let result = self
            .command("systemctl")
            .args(["disable", unit])
            .allow_fail()
            .run()?;
        if result.success() {
            println!("  Disabled {}", unit);
        }
        Ok(())
    }
}
