//! Preflight checks for image builds.
//!
//! Validates host tools and the build environment before touching any
//! loop device. Run with `rpi-imgbuild preflight` to check everything is
//! ready.

mod environment;
mod host_tools;
mod types;

use std::path::Path;

use anyhow::{bail, Result};

use crate::config::Config;

pub use environment::{is_mount_point, is_root, qemu_binfmt_name};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(config: &Config, work_dir: &Path) -> PreflightReport {
    let mut checks = Vec::new();

    println!("Running preflight checks...\n");

    println!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(config));

    println!("Checking build environment...");
    checks.extend(environment::check_build_environment(config, work_dir));

    println!();

    PreflightReport { checks }
}

/// Run preflight and bail if any checks fail.
pub fn run_preflight_or_fail(config: &Config, work_dir: &Path) -> Result<()> {
    let report = run_preflight(config, work_dir);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed ({}). Fix the issues above before building.",
            report.fail_count(),
            report.failures().join(", ")
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

/// Fail unless running as root.
pub fn require_root(action: &str) -> Result<()> {
    if !is_root() {
        bail!("{} must run as root. Re-run with sudo.", action);
    }
    Ok(())
}
