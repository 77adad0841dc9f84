//! Configuration management for rpi-imgbuild.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over .env file; command-line
//! flags take precedence over both (applied by the command handlers).

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOSTNAME: &str = "raspberrypi";
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";
pub const DEFAULT_SUITE: &str = "stable";
pub const DEFAULT_ARCH: &str = "arm64";
pub const DEFAULT_VARIANT: &str = "minbase";
pub const DEFAULT_BOOTSTRAP_MIRROR: &str = "http://ftp.debian.org/debian";
pub const DEFAULT_APT_MIRROR: &str = "http://deb.debian.org/debian";
pub const DEFAULT_KEYRING: &str = "/usr/share/keyrings/debian-archive-keyring.gpg";
pub const DEFAULT_KERNEL_PACKAGE: &str = "linux-image-arm64";
pub const DEFAULT_IMAGE_SIZE_MB: u64 = 1024;
pub const DEFAULT_BOOT_SIZE_MB: u64 = 256;
pub const DEFAULT_MOUNT_DIR: &str = "/mnt";

/// Smallest root partition a minbase system fits in.
pub const MIN_ROOT_SIZE_MB: u64 = 256;
/// Largest image size accepted (2 TiB, the msdos label limit).
pub const MAX_IMAGE_SIZE_MB: u64 = 2 * 1024 * 1024;

pub const DEFAULT_COMPONENTS: &[&str] = &["main", "contrib", "non-free"];

/// Packages passed to debootstrap `--include`.
pub const DEFAULT_PACKAGES: &[&str] = &[
    "dosfstools",
    "firmware-brcm80211",
    "firmware-realtek",
    "haveged",
    "iproute2",
    "parted",
    "raspi3-firmware",
    "systemd",
    "systemd-sysv",
    "ssh",
    "wireless-tools",
    "wpasupplicant",
];

/// Packages removed from a booted device by `customize`.
pub const DEFAULT_PURGE_PACKAGES: &[&str] = &[
    "ifupdown",
    "isc-dhcp-client",
    "dhcpcd5",
    "avahi-daemon",
    "triggerhappy",
];

/// Values written to /etc/default/keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub layout: String,
    pub model: String,
    pub variant: String,
    pub options: String,
    pub backspace: String,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self {
            layout: "us".to_string(),
            model: "pc105".to_string(),
            variant: String::new(),
            options: String::new(),
            backspace: "guess".to_string(),
        }
    }
}

/// rpi-imgbuild configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname written to /etc/hostname and /etc/hosts
    pub hostname: String,
    /// Locale for /etc/default/locale (e.g., "en_US.UTF-8")
    pub locale: String,
    pub keyboard: Keyboard,
    /// Debian suite passed to debootstrap and apt (e.g., "stable", "bookworm")
    pub suite: String,
    /// Mirror debootstrap fetches from
    pub bootstrap_mirror: String,
    /// Mirror written to /etc/apt/sources.list
    pub apt_mirror: String,
    pub components: Vec<String>,
    /// Target architecture (debootstrap --arch)
    pub arch: String,
    /// debootstrap --variant
    pub variant: String,
    pub keyring: PathBuf,
    /// Extra packages for debootstrap --include
    pub packages: Vec<String>,
    pub kernel_package: String,
    /// Packages purged by `customize`
    pub purge_packages: Vec<String>,
    pub image_size_mb: u64,
    pub boot_size_mb: u64,
    /// Where the root partition is mounted during the build
    pub mount_dir: PathBuf,
    /// Root password; root stays locked when unset
    pub root_password: Option<String>,
    /// Write /etc/vim/vimrc
    pub vim_config: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            keyboard: Keyboard::default(),
            suite: DEFAULT_SUITE.to_string(),
            bootstrap_mirror: DEFAULT_BOOTSTRAP_MIRROR.to_string(),
            apt_mirror: DEFAULT_APT_MIRROR.to_string(),
            components: to_owned_list(DEFAULT_COMPONENTS),
            arch: DEFAULT_ARCH.to_string(),
            variant: DEFAULT_VARIANT.to_string(),
            keyring: PathBuf::from(DEFAULT_KEYRING),
            packages: to_owned_list(DEFAULT_PACKAGES),
            kernel_package: DEFAULT_KERNEL_PACKAGE.to_string(),
            purge_packages: to_owned_list(DEFAULT_PURGE_PACKAGES),
            image_size_mb: DEFAULT_IMAGE_SIZE_MB,
            boot_size_mb: DEFAULT_BOOT_SIZE_MB,
            mount_dir: PathBuf::from(DEFAULT_MOUNT_DIR),
            root_password: None,
            vim_config: true,
        }
    }
}

impl Config {
    /// Load configuration from .env file and environment.
    ///
    /// `.env` is looked up in `base_dir` (normally the working directory).
    pub fn load(base_dir: &Path) -> Result<Self> {
        let mut env_vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            let iter = dotenvy::from_path_iter(&env_path)
                .with_context(|| format!("Failed to read {}", env_path.display()))?;
            for item in iter {
                let (key, value) =
                    item.with_context(|| format!("Malformed line in {}", env_path.display()))?;
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for (key, value) in std::env::vars() {
            if key.starts_with("RPI_") {
                env_vars.insert(key, value);
            }
        }

        Self::from_vars(&env_vars)
    }

    /// Build a config from `RPI_*` variables, falling back to defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("RPI_HOSTNAME") {
            validate_hostname(v)?;
            config.hostname = v.to_string();
        }
        if let Some(v) = get("RPI_LOCALE") {
            config.locale = v.to_string();
        }
        if let Some(v) = get("RPI_KEYBOARD_LAYOUT") {
            config.keyboard.layout = v.to_string();
        }
        if let Some(v) = get("RPI_KEYBOARD_MODEL") {
            config.keyboard.model = v.to_string();
        }
        if let Some(v) = get("RPI_KEYBOARD_VARIANT") {
            config.keyboard.variant = v.to_string();
        }
        if let Some(v) = get("RPI_KEYBOARD_OPTIONS") {
            config.keyboard.options = v.to_string();
        }
        if let Some(v) = get("RPI_KEYBOARD_BACKSPACE") {
            config.keyboard.backspace = v.to_string();
        }
        if let Some(v) = get("RPI_SUITE") {
            config.suite = v.to_string();
        }
        if let Some(v) = get("RPI_BOOTSTRAP_MIRROR") {
            config.bootstrap_mirror = v.to_string();
        }
        if let Some(v) = get("RPI_APT_MIRROR") {
            config.apt_mirror = v.to_string();
        }
        if let Some(v) = get("RPI_COMPONENTS") {
            config.components = parse_list(v);
        }
        if let Some(v) = get("RPI_ARCH") {
            config.arch = v.to_string();
        }
        if let Some(v) = get("RPI_VARIANT") {
            config.variant = v.to_string();
        }
        if let Some(v) = get("RPI_KEYRING") {
            config.keyring = PathBuf::from(v);
        }
        if let Some(v) = get("RPI_PACKAGES") {
            config.packages = parse_list(v);
        }
        if let Some(v) = get("RPI_EXTRA_PACKAGES") {
            for pkg in parse_list(v) {
                if !config.packages.contains(&pkg) {
                    config.packages.push(pkg);
                }
            }
        }
        if let Some(v) = get("RPI_KERNEL_PACKAGE") {
            config.kernel_package = v.to_string();
        }
        if let Some(v) = get("RPI_PURGE_PACKAGES") {
            config.purge_packages = parse_list(v);
        }
        if let Some(v) = get("RPI_IMAGE_SIZE_MB") {
            config.image_size_mb = parse_mb("RPI_IMAGE_SIZE_MB", v)?;
        }
        if let Some(v) = get("RPI_BOOT_SIZE_MB") {
            config.boot_size_mb = parse_mb("RPI_BOOT_SIZE_MB", v)?;
        }
        if let Some(v) = get("RPI_MOUNT_DIR") {
            config.mount_dir = PathBuf::from(v);
        }
        if let Some(v) = get("RPI_ROOT_PASSWORD") {
            config.root_password = Some(v.to_string());
        }
        if let Some(v) = get("RPI_VIM_CONFIG") {
            config.vim_config = parse_bool("RPI_VIM_CONFIG", v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.hostname)?;
        validate_locale(&self.locale)?;
        if self.boot_size_mb == 0 {
            bail!("Boot partition size must be greater than 0 MB");
        }
        // Root partition needs room for a minbase system.
        let min_image_mb = match self.boot_size_mb.checked_add(MIN_ROOT_SIZE_MB) {
            Some(mb) if mb <= MAX_IMAGE_SIZE_MB => mb,
            _ => bail!(
                "Boot partition size {} MB is too large",
                self.boot_size_mb
            ),
        };
        if self.image_size_mb > MAX_IMAGE_SIZE_MB {
            bail!(
                "Image size {} MB exceeds the {} MB limit",
                self.image_size_mb,
                MAX_IMAGE_SIZE_MB
            );
        }
        if self.image_size_mb < min_image_mb {
            bail!(
                "Image size {} MB leaves less than 256 MB for the root partition (boot is {} MB)",
                self.image_size_mb,
                self.boot_size_mb
            );
        }
        if self.components.is_empty() {
            bail!("At least one apt component is required");
        }
        Ok(())
    }

    /// Mount point of the boot partition inside the mounted root.
    pub fn boot_mount_dir(&self) -> PathBuf {
        self.mount_dir.join("boot/firmware")
    }

    /// SHA256 over every input that shapes the debootstrap result.
    ///
    /// A resumed build only trusts a previous debootstrap when this matches.
    pub fn bootstrap_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.arch.as_str(),
            self.suite.as_str(),
            self.variant.as_str(),
            self.bootstrap_mirror.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0]);
        }
        hasher.update(self.components.join(",").as_bytes());
        hasher.update([0]);
        hasher.update(self.packages.join(",").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  RPI_HOSTNAME: {}", self.hostname);
        println!("  RPI_LOCALE: {}", self.locale);
        println!(
            "  RPI_KEYBOARD_*: layout={} model={} variant={} options={} backspace={}",
            self.keyboard.layout,
            self.keyboard.model,
            self.keyboard.variant,
            self.keyboard.options,
            self.keyboard.backspace
        );
        println!("  RPI_ARCH: {}", self.arch);
        println!("  RPI_SUITE: {}", self.suite);
        println!("  RPI_VARIANT: {}", self.variant);
        println!("  RPI_BOOTSTRAP_MIRROR: {}", self.bootstrap_mirror);
        println!("  RPI_APT_MIRROR: {}", self.apt_mirror);
        println!("  RPI_COMPONENTS: {}", self.components.join(" "));
        println!("  RPI_KEYRING: {}", self.keyring.display());
        println!("  RPI_PACKAGES: {}", self.packages.join(","));
        println!("  RPI_KERNEL_PACKAGE: {}", self.kernel_package);
        println!("  RPI_PURGE_PACKAGES: {}", self.purge_packages.join(","));
        println!("  RPI_IMAGE_SIZE_MB: {}", self.image_size_mb);
        println!("  RPI_BOOT_SIZE_MB: {}", self.boot_size_mb);
        println!("  RPI_MOUNT_DIR: {}", self.mount_dir.display());
        println!(
            "  RPI_ROOT_PASSWORD: {}",
            if self.root_password.is_some() {
                "(set)"
            } else {
                "(unset, root login locked)"
            }
        );
        println!("  RPI_VIM_CONFIG: {}", self.vim_config);
        if self.keyring.exists() {
            println!("  Keyring: FOUND");
        } else {
            println!("  Keyring: NOT FOUND (install debian-archive-keyring)");
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Split a list on commas and whitespace.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_mb(key: &str, value: &str) -> Result<u64> {
    let trimmed = value.trim_end_matches(['M', 'm']);
    trimmed
        .parse::<u64>()
        .with_context(|| format!("{} must be a size in MB, got '{}'", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{} must be a boolean, got '{}'", key, value),
    }
}

/// RFC 1123 hostname label: 1-63 chars, alphanumerics and '-', no leading/trailing '-'.
/// Locales must name their charset (`en_US.UTF-8`); `C` and `POSIX` are
/// always available.
pub fn validate_locale(locale: &str) -> Result<()> {
    if locale == "C" || locale == "POSIX" {
        return Ok(());
    }
    match locale.split_once('.') {
        Some((name, charset)) if !name.is_empty() && !charset.is_empty() => Ok(()),
        _ => bail!(
            "Locale '{}' must include a charset, e.g. {}.UTF-8",
            locale,
            locale
        ),
    }
}

pub fn validate_hostname(hostname: &str) -> Result<()> {
    let valid = !hostname.is_empty()
        && hostname.len() <= 63
        && !hostname.starts_with('-')
        && !hostname.ends_with('-')
        && hostname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        bail!("Invalid hostname '{}'", hostname);
    }
    Ok(())
}
