//! Customize command - post-boot cleanup on a running Raspberry Pi.
//!
//! Runs on the device itself (no chroot): strips packages the image does
//! not need, moves networking over to systemd-networkd/resolved and applies
//! the same locale, keyboard, apt and ssh configuration as the image build.

use anyhow::Result;

use crate::config::Config;
use crate::preflight;
use crate::system::{self, SystemRoot};
use crate::timing::Timer;

/// Options for the customize command.
#[derive(Debug, Clone, Default)]
pub struct CustomizeOptions {
    /// Keep installed packages.
    pub skip_purge: bool,
    /// Also rewrite /etc/hostname and /etc/hosts.
    pub set_hostname: bool,
}

/// Execute the customize command.
pub fn cmd_customize(options: &CustomizeOptions, config: &Config) -> Result<()> {
    preflight::require_root("rpi-imgbuild customize")?;
    println!("=== Customizing this device ===\n");

    let root = SystemRoot::live();

    if options.skip_purge {
        println!("Skipping package purge");
    } else {
        let t = Timer::start("Package cleanup");
        println!("Removing unneeded packages...");
        system::purge_packages(&root, &config.purge_packages)?;
        system::autoremove(&root)?;
        system::apt_clean(&root)?;
        t.finish();
    }

    let t = Timer::start("Configuration");
    if options.set_hostname {
        system::configure_hostname(&root, &config.hostname)?;
    }
    system::configure_locale(&root, &config.locale)?;
    system::configure_keyboard(&root, &config.keyboard)?;
    system::configure_apt(&root, &config.apt_mirror, &config.suite, &config.components)?;
    system::apt_update(&root)?;

    system::disable_legacy_networking(&root)?;
    system::configure_networking(&root)?;
    system::configure_sshd(&root)?;

    if let Some(password) = &config.root_password {
        system::change_root_password(&root, password)?;
    }
    if config.vim_config {
        system::configure_vim(&root)?;
    }
    t.finish();

    println!("\n=== Device customized ===");
    println!("  Networking switches to systemd-networkd on next boot.");
    println!("  Reboot to apply: systemctl reboot");
    Ok(())
}
