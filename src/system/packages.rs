//! apt/dpkg package management.

use anyhow::Result;
use std::collections::BTreeSet;

use super::SystemRoot;

/// Names of installed packages.
pub fn installed_packages(root: &SystemRoot) -> Result<BTreeSet<String>> {
    let result = root
        .command("dpkg-query")
        .args(["-W", "-f", "${Package} ${Status}\\n"])
        .error_msg("dpkg-query failed")
        .run()?;
    Ok(parse_installed(&result.stdout))
}

/// Parse `dpkg-query -W -f '${Package} ${Status}\n'` output.
fn parse_installed(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let (name, status) = line.trim().split_once(' ')?;
            status.ends_with(" installed").then(|| name.to_string())
        })
        .collect()
}

/// Purge the listed packages that are actually installed.
///
/// Returns the packages that were purged.
pub fn purge_packages(root: &SystemRoot, packages: &[String]) -> Result<Vec<String>> {
    let installed = installed_packages(root)?;
    let present: Vec<String> = packages
        .iter()
        .filter(|p| installed.contains(p.as_str()))
        .cloned()
        .collect();

    if present.is_empty() {
        println!("  Nothing to purge");
        return Ok(present);
    }

    println!("  Purging {}...", present.join(" "));
    root.command("apt-get")
        .args(["purge", "-y"])
        .args(&present)
        .error_msg("apt-get purge failed")
        .run_interactive()?;
    Ok(present)
}

/// Refresh package lists.
pub fn apt_update(root: &SystemRoot) -> Result<()> {
    root.command("apt-get")
        .arg("update")
        .error_msg("apt-get update failed")
        .run_interactive()?;
    Ok(())
}

/// Remove packages that are no longer needed.
pub fn autoremove(root: &SystemRoot) -> Result<()> {
    root.command("apt-get")
        .args(["autoremove", "--purge", "-y"])
        .error_msg("apt-get autoremove failed")
        .run_interactive()?;
    Ok(())
}

/// Drop downloaded .deb files.
pub fn apt_clean(root: &SystemRoot) -> Result<()> {
    root.command("apt-get")
        .arg("clean")
        .error_msg("apt-get clean failed")
        .run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed() {
        let output = "\
ifupdown install ok installed
dhcpcd5 deinstall ok config-files
openssh-server install ok installed
avahi-daemon unknown ok not-installed
";
        let installed = parse_installed(output);
        assert_eq!(
            installed.into_iter().collect::<Vec<_>>(),
            vec!["ifupdown", "openssh-server"]
        );
    }
}
