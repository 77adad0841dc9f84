//! OpenSSH server configuration.

use anyhow::{bail, Result};
use regex::Regex;

use super::network::has_unit;
use super::SystemRoot;

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// Rewrite sshd_config so root may log in with a password.
///
/// Active `PermitRootLogin` directives are changed in place; otherwise the
/// first commented one is uncommented, and failing that one is appended.
pub fn permit_root_login(config: &str) -> Result<String> {
    let active = Regex::new(r"(?m)^[ \t]*PermitRootLogin[ \t]+.*$")?;
    if active.is_match(config) {
        return Ok(active
            .replace_all(config, "PermitRootLogin yes")
            .into_owned());
    }

    let commented = Regex::new(r"(?m)^[ \t]*#[ \t]*PermitRootLogin[ \t]+.*$")?;
    if commented.is_match(config) {
        return Ok(commented.replace(config, "PermitRootLogin yes").into_owned());
    }

    let mut out = config.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("PermitRootLogin yes\n");
    Ok(out)
}

/// Allow root logins and enable the ssh service.
pub fn configure_sshd(root: &SystemRoot) -> Result<()> {
    println!("Configuring ssh...");
    let path = root.path(SSHD_CONFIG);
    if !path.exists() {
        bail!(
            "{} not found. Is the ssh package installed?",
            path.display()
        );
    }

    let config = root.read_file(SSHD_CONFIG)?;
    root.write_file(SSHD_CONFIG, &permit_root_login(&config)?)?;

    if has_unit(root, "ssh.service") {
        root.enable_service("ssh")?;
    } else {
        eprintln!("  [WARN] ssh.service not installed, not enabling");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncomments_default() {
        let config = "Port 22\n#PermitRootLogin prohibit-password\n#MaxAuthTries 6\n";
        assert_eq!(
            permit_root_login(config).unwrap(),
            "Port 22\nPermitRootLogin yes\n#MaxAuthTries 6\n"
        );
    }

    #[test]
    fn test_rewrites_active_directive() {
        let config = "# PermitRootLogin no\nPermitRootLogin no\n";
        assert_eq!(
            permit_root_login(config).unwrap(),
            "# PermitRootLogin no\nPermitRootLogin yes\n"
        );
    }

    #[test]
    fn test_appends_when_absent() {
        assert_eq!(
            permit_root_login("Port 22").unwrap(),
            "Port 22\nPermitRootLogin yes\n"
        );
    }

    #[test]
    fn test_leaves_match_blocks_alone() {
        let config = "#PermitRootLogin prohibit-password\nMatch User anoncvs\n\tX11Forwarding no\n";
        let out = permit_root_login(config).unwrap();
        assert!(out.starts_with("PermitRootLogin yes\n"));
        assert!(out.contains("\tX11Forwarding no"));
    }
}
