//! systemd-networkd / systemd-resolved networking.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use super::SystemRoot;

/// DHCP on every interface.
pub const DHCP_NETWORK: &str = "[Match]\nName=*\n\n[Network]\nDHCP=ipv4\n";

const NETWORK_FILE: &str = "/etc/systemd/network/99-default.network";
const RESOLVED_DIR: &str = "/run/systemd/resolve";
const RESOLVED_CONF: &str = "/run/systemd/resolve/resolv.conf";
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Services replaced by networkd on Debian/Raspbian.
const LEGACY_SERVICES: &[&str] = &["networking.service", "dhcpcd.service"];

/// Whether a systemd unit file is installed in the system.
pub(crate) fn has_unit(root: &SystemRoot, unit: &str) -> bool {
    [
        "/usr/lib/systemd/system",
        "/lib/systemd/system",
        "/etc/systemd/system",
    ]
    .iter()
    .any(|dir| root.path(&format!("{}/{}", dir, unit)).exists())
}

/// Configure DHCP networking with networkd and DNS with resolved.
pub fn configure_networking(root: &SystemRoot) -> Result<()> {
    println!("Configuring networking...");

    if has_unit(root, "dbus.service") {
        root.enable_service("dbus")?;
    } else {
        eprintln!("  [WARN] dbus.service not installed, skipping");
    }

    root.write_file(NETWORK_FILE, DHCP_NETWORK)?;
    root.enable_service("systemd-networkd")?;

    if has_unit(root, "systemd-resolved.service") {
        link_resolv_conf(root)?;
        root.enable_service("systemd-resolved")?;
    } else {
        eprintln!(
            "  [WARN] systemd-resolved not installed, leaving {} untouched",
            RESOLV_CONF
        );
    }

    Ok(())
}

/// Point /etc/resolv.conf at resolved's generated file.
///
/// Inside a chroot the host's resolver config is copied to the link target
/// so apt keeps working for the rest of the build.
fn link_resolv_conf(root: &SystemRoot) -> Result<()> {
    let resolv = root.path(RESOLV_CONF);

    if root.is_chroot() {
        let run_dir = root.path(RESOLVED_DIR);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create {}", run_dir.display()))?;
        let host_resolv = Path::new(RESOLV_CONF);
        if host_resolv.exists() {
            let dest = root.path(RESOLVED_CONF);
            fs::copy(host_resolv, &dest).with_context(|| {
                format!("Failed to copy host resolv.conf to {}", dest.display())
            })?;
        }
    }

    if resolv.exists() || resolv.is_symlink() {
        fs::remove_file(&resolv)
            .with_context(|| format!("Failed to remove {}", resolv.display()))?;
    }
    symlink(RESOLVED_CONF, &resolv)
        .with_context(|| format!("Failed to symlink {}", resolv.display()))?;
    println!("  Linked {} -> {}", RESOLV_CONF, RESOLVED_CONF);
    Ok(())
}

/// Disable ifupdown and dhcpcd so they don't race networkd.
pub fn disable_legacy_networking(root: &SystemRoot) -> Result<()> {
    for unit in LEGACY_SERVICES {
        if has_unit(root, unit) {
            root.disable_service(unit)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_has_unit() {
        let dir = TempDir::new().unwrap();
        let root = SystemRoot::chroot(dir.path());
        assert!(!has_unit(&root, "ssh.service"));

        fs::create_dir_all(dir.path().join("lib/systemd/system")).unwrap();
        fs::write(dir.path().join("lib/systemd/system/ssh.service"), "").unwrap();
        assert!(has_unit(&root, "ssh.service"));
    }

    #[test]
    fn test_link_resolv_conf_replaces_file() {
        let dir = TempDir::new().unwrap();
        let root = SystemRoot::chroot(dir.path());
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/resolv.conf"), "nameserver 1.1.1.1\n").unwrap();

        link_resolv_conf(&root).unwrap();

        let link = dir.path().join("etc/resolv.conf");
        assert!(link.is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap(),
            Path::new("/run/systemd/resolve/resolv.conf")
        );
        assert!(dir.path().join("run/systemd/resolve").is_dir());
    }

    #[test]
    fn test_dhcp_network() {
        assert!(DHCP_NETWORK.contains("Name=*"));
        assert!(DHCP_NETWORK.contains("DHCP=ipv4"));
    }
}
