//! Integration tests for the chroot configuration writers.
//!
//! These run against a mock root filesystem in a temp dir and only cover
//! steps that don't need root (no chroot, mount or systemctl).

mod helpers;

use helpers::{assert_file_contains, assert_file_eq, TestEnv};
use rpi_imgbuild::config::{Config, Keyboard};
use rpi_imgbuild::system;
use std::fs;

#[test]
fn test_hostname_and_hosts() {
    let env = TestEnv::new();
    system::configure_hostname(&env.system_root(), "raspberrypi").unwrap();

    assert_file_eq(&env.path("/etc/hostname"), "raspberrypi\n");
    assert_file_eq(
        &env.path("/etc/hosts"),
        "127.0.0.1    localhost\n127.0.1.1    raspberrypi\n",
    );
}

#[test]
fn test_locale_without_locales_package() {
    let env = TestEnv::new();
    system::configure_locale(&env.system_root(), "en_GB.UTF-8").unwrap();

    assert_file_eq(
        &env.path("/etc/default/locale"),
        "LANG=en_GB.UTF-8\nLC_ALL=en_GB.UTF-8\nLANGUAGE=en_GB:en\n",
    );
    assert!(!env.path("/etc/locale.gen").exists());
}

#[test]
fn test_locale_gen_is_updated_when_present() {
    let env = TestEnv::new();
    fs::write(
        env.path("/etc/locale.gen"),
        "# en_GB.UTF-8 UTF-8\n# en_US.UTF-8 UTF-8\n",
    )
    .unwrap();

    system::configure_locale(&env.system_root(), "en_US.UTF-8").unwrap();

    assert_file_eq(
        &env.path("/etc/locale.gen"),
        "# en_GB.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n",
    );
}

#[test]
fn test_keyboard() {
    let env = TestEnv::new();
    let keyboard = Keyboard {
        layout: "de".to_string(),
        variant: "nodeadkeys".to_string(),
        ..Keyboard::default()
    };
    system::configure_keyboard(&env.system_root(), &keyboard).unwrap();

    let path = env.path("/etc/default/keyboard");
    assert_file_contains(&path, "XKBLAYOUT=\"de\"\n");
    assert_file_contains(&path, "XKBVARIANT=\"nodeadkeys\"\n");
    assert_file_contains(&path, "XKBMODEL=\"pc105\"\n");
}

#[test]
fn test_apt_sources_and_recommends() {
    let env = TestEnv::new();
    let config = Config::default();
    system::configure_apt(
        &env.system_root(),
        &config.apt_mirror,
        &config.suite,
        &config.components,
    )
    .unwrap();

    assert_file_eq(
        &env.path("/etc/apt/sources.list"),
        "deb http://deb.debian.org/debian stable main contrib non-free\n",
    );
    assert_file_eq(
        &env.path("/etc/apt/apt.conf.d/99disable-suggested"),
        system::APT_NO_RECOMMENDS,
    );
}

#[test]
fn test_fstab() {
    let env = TestEnv::new();
    system::write_fstab(&env.system_root(), "5DE4-665C", "7e3b1f0a-1c2d").unwrap();

    let fstab = fs::read_to_string(env.path("/etc/fstab")).unwrap();
    let entries: Vec<Vec<&str>> = fstab
        .lines()
        .map(|l| l.split_whitespace().collect())
        .collect();

    assert_eq!(
        entries[0],
        vec!["UUID=5DE4-665C", "/boot/firmware", "vfat", "defaults", "0", "2"]
    );
    assert_eq!(
        entries[1],
        vec!["UUID=7e3b1f0a-1c2d", "/", "ext4", "defaults,noatime", "0", "1"]
    );
    assert_eq!(entries[2], vec!["proc", "/proc", "proc", "defaults", "0", "0"]);
}

#[test]
fn test_sshd_permits_root_login() {
    let env = TestEnv::new();
    // No ssh.service in the mock tree, so nothing is enabled.
    system::configure_sshd(&env.system_root()).unwrap();

    assert_file_eq(
        &env.path("/etc/ssh/sshd_config"),
        "Include /etc/ssh/sshd_config.d/*.conf\nPermitRootLogin yes\nUsePAM yes\n",
    );
}

#[test]
fn test_sshd_missing_config_fails() {
    let env = TestEnv::new();
    fs::remove_file(env.path("/etc/ssh/sshd_config")).unwrap();

    let err = system::configure_sshd(&env.system_root()).unwrap_err();
    assert!(err.to_string().contains("Is the ssh package installed?"));
}

#[test]
fn test_vim_config() {
    let env = TestEnv::new();
    system::configure_vim(&env.system_root()).unwrap();

    let vimrc = env.path("/etc/vim/vimrc");
    assert_file_contains(&vimrc, "set expandtab\n");
    assert_file_contains(&vimrc, "autocmd FileType make setlocal noexpandtab");
}

#[test]
fn test_root_hash_replacement_on_mock_shadow() {
    let env = TestEnv::new();
    let shadow = fs::read_to_string(env.path("/etc/shadow")).unwrap();

    let updated = system::replace_root_hash(&shadow, "$5$abc$def").unwrap();

    assert!(updated.starts_with("root:$5$abc$def:19000:"));
    assert!(updated.contains("daemon:*:19000:"));
}

#[test]
fn test_mock_rootfs_passes_structure_check_but_not_size() {
    let env = TestEnv::new();
    fs::create_dir_all(env.path("/usr/lib")).unwrap();

    let err = rpi_imgbuild::debootstrap::validate_rootfs(&env.rootfs).unwrap_err();
    assert!(err.to_string().contains("too small"));
}
