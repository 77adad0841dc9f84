//! rpi-imgbuild - Raspberry Pi Debian image builder.
//!
//! Builds a bootable arm64 Debian image for Raspberry Pi:
//! - MBR disk with a FAT32 boot and an ext4 root partition
//! - Minimal root filesystem from a cross-architecture debootstrap
//! - Hostname, locale, keyboard, apt, fstab, networkd and ssh configured
//!   in a chroot
//!
//! `customize` applies the post-boot cleanup on a running device.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rpi_imgbuild::commands;
use rpi_imgbuild::config::Config;

#[derive(Parser)]
#[command(name = "rpi-imgbuild")]
#[command(about = "Raspberry Pi Debian image builder")]
#[command(
    after_help = "QUICK START:\n  rpi-imgbuild preflight        Check host tools and environment\n  sudo rpi-imgbuild create pi.img  Build an image\n  sudo rpi-imgbuild customize   Post-boot cleanup (run on the Pi)\n  rpi-imgbuild clean pi.img     Release leftovers of a failed build"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Config overrides shared by create and customize.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Hostname of the device
    #[arg(long)]
    hostname: Option<String>,
    /// Locale (e.g. en_US.UTF-8)
    #[arg(long)]
    locale: Option<String>,
    /// Keyboard layout (e.g. us, de)
    #[arg(long)]
    keyboard_layout: Option<String>,
    /// Debian suite (e.g. stable, bookworm)
    #[arg(long)]
    suite: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a Raspberry Pi image (requires root)
    Create {
        /// Image file to create
        image: PathBuf,

        /// Ignore recorded progress and rebuild every stage
        #[arg(long)]
        fresh: bool,

        /// Skip preflight checks
        #[arg(long)]
        skip_preflight: bool,

        /// Image size in MB (default: 1024)
        #[arg(long)]
        size_mb: Option<u64>,

        /// Boot partition size in MB (default: 256)
        #[arg(long)]
        boot_size_mb: Option<u64>,

        /// Target architecture (default: arm64)
        #[arg(long)]
        arch: Option<String>,

        /// Mirror debootstrap downloads from
        #[arg(long)]
        mirror: Option<String>,

        /// Where to mount the image while building (default: /mnt)
        #[arg(long)]
        mount_dir: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Strip packages and reconfigure networking on a running device (requires root)
    Customize {
        /// Keep installed packages
        #[arg(long)]
        skip_purge: bool,

        /// Also rewrite /etc/hostname and /etc/hosts
        #[arg(long)]
        set_hostname: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run preflight checks (verify host tools before building)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Release loop devices/mounts left by a failed build and remove its status
    Clean {
        /// Image file of the failed build
        image: PathBuf,

        /// Delete the image file as well
        #[arg(long)]
        remove_image: bool,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show recorded build stages for an image
    Status {
        /// Image file
        image: PathBuf,
    },
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.hostname {
            config.hostname = v;
        }
        if let Some(v) = self.locale {
            config.locale = v;
        }
        if let Some(v) = self.keyboard_layout {
            config.keyboard.layout = v;
        }
        if let Some(v) = self.suite {
            config.suite = v;
        }
    }
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors (e.g. a missing image argument) exit 1; help and
            // version output exit 0.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

fn main() -> Result<()> {
    let cli = parse_cli();
    let base_dir = std::env::current_dir()?;

    let mut config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Create {
            image,
            fresh,
            skip_preflight,
            size_mb,
            boot_size_mb,
            arch,
            mirror,
            mount_dir,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(v) = size_mb {
                config.image_size_mb = v;
            }
            if let Some(v) = boot_size_mb {
                config.boot_size_mb = v;
            }
            if let Some(v) = arch {
                config.arch = v;
            }
            if let Some(v) = mirror {
                config.bootstrap_mirror = v;
            }
            if let Some(v) = mount_dir {
                config.mount_dir = v;
            }
            config.validate()?;

            let options = commands::create::CreateOptions {
                image,
                fresh,
                skip_preflight,
            };
            commands::cmd_create(&base_dir, &options, &config)?;
        }

        Commands::Customize {
            skip_purge,
            set_hostname,
            overrides,
        } => {
            overrides.apply(&mut config);
            config.validate()?;
            let options = commands::customize::CustomizeOptions {
                skip_purge,
                set_hostname,
            };
            commands::cmd_customize(&options, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&base_dir, &config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Status { image } => commands::show::ShowTarget::Status { image },
            };
            commands::cmd_show(&base_dir, show_target, &config)?;
        }

        Commands::Clean {
            image,
            remove_image,
        } => {
            commands::cmd_clean(&base_dir, &image, remove_image)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_image() {
        let err = Cli::try_parse_from(["rpi-imgbuild", "create"]).err().unwrap();
        assert!(err.use_stderr());
    }

    #[test]
    fn test_create_flags() {
        let cli = Cli::try_parse_from([
            "rpi-imgbuild",
            "create",
            "pi.img",
            "--fresh",
            "--hostname",
            "garage",
            "--size-mb",
            "2048",
        ])
        .unwrap();
        match cli.command {
            Commands::Create {
                image,
                fresh,
                size_mb,
                overrides,
                ..
            } => {
                assert_eq!(image, PathBuf::from("pi.img"));
                assert!(fresh);
                assert_eq!(size_mb, Some(2048));
                assert_eq!(overrides.hostname.as_deref(), Some("garage"));
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_customize_takes_no_arguments() {
        assert!(Cli::try_parse_from(["rpi-imgbuild", "customize"]).is_ok());
        assert!(Cli::try_parse_from(["rpi-imgbuild", "customize", "extra"]).is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        Overrides {
            hostname: Some("den".to_string()),
            suite: Some("bookworm".to_string()),
            ..Overrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.hostname, "den");
        assert_eq!(config.suite, "bookworm");
        assert_eq!(config.locale, "en_US.UTF-8");
    }
}
