//! /etc configuration files: identity, locale, keyboard, apt, fstab, vim.

use anyhow::{bail, Result};
use regex::Regex;

use super::SystemRoot;
use crate::config::Keyboard;

pub const APT_NO_RECOMMENDS: &str = "APT::Install-Recommends \"false\";\n\
APT::Install-Suggests \"false\";\n";

const VIMRC: &str = r#"syntax on
set number
set ts=4
set sts=4
set sw=4
set expandtab

autocmd FileType make setlocal noexpandtab
autocmd FileType yaml setlocal ts=2 sts=2 sw=2 expandtab
"#;

pub fn hosts_content(hostname: &str) -> String {
    format!("127.0.0.1    localhost\n127.0.1.1    {}\n", hostname)
}

/// Write /etc/hostname and /etc/hosts.
pub fn configure_hostname(root: &SystemRoot, hostname: &str) -> Result<()> {
    root.write_file("/etc/hostname", &format!("{}\n", hostname))?;
    root.write_file("/etc/hosts", &hosts_content(hostname))?;
    Ok(())
}

/// `/etc/default/locale` content for `locale` (e.g. "en_US.UTF-8").
fn locale_content(locale: &str) -> String {
    let lang_region = locale.split('.').next().unwrap_or(locale);
    let lang = lang_region.split('_').next().unwrap_or(lang_region);
    let language = if lang == lang_region {
        lang.to_string()
    } else {
        format!("{}:{}", lang_region, lang)
    };
    format!(
        "LANG={locale}\nLC_ALL={locale}\nLANGUAGE={language}\n",
        locale = locale,
        language = language
    )
}

/// Enable `locale` in a locale.gen file, uncommenting or appending it.
fn enable_locale_gen(content: &str, locale: &str) -> Result<String> {
    let charset = match locale.split_once('.') {
        Some((_, c)) if !c.is_empty() => c,
        _ => bail!(
            "Locale '{}' has no charset; use e.g. {}.UTF-8",
            locale,
            locale
        ),
    };
    let commented = Regex::new(&format!(
        r"(?m)^#[ \t]*({}[ \t]+{})[ \t]*$",
        regex::escape(locale),
        regex::escape(charset)
    ))?;
    if commented.is_match(content) {
        return Ok(commented.replace_all(content, "$1").into_owned());
    }

    let active = Regex::new(&format!(r"(?m)^{}[ \t]", regex::escape(locale)))?;
    if active.is_match(content) {
        return Ok(content.to_string());
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!("{} {}\n", locale, charset));
    Ok(out)
}

/// Write /etc/default/locale and generate the locale when possible.
pub fn configure_locale(root: &SystemRoot, locale: &str) -> Result<()> {
    root.write_file("/etc/default/locale", &locale_content(locale))?;

    // C and POSIX are built into libc and never generated.
    if locale == "C" || locale == "POSIX" {
        return Ok(());
    }

    let locale_gen = root.path("/etc/locale.gen");
    if locale_gen.exists() {
        let content = root.read_file("/etc/locale.gen")?;
        root.write_file("/etc/locale.gen", &enable_locale_gen(&content, locale)?)?;
    }

    // minbase images lack the locales package; the locale is generated once
    // it is installed.
    if root.path("/usr/sbin/locale-gen").exists() {
        println!("  Generating {}...", locale);
        root.command("locale-gen")
            .error_msg(format!("locale-gen failed for {}", locale))
            .run()?;
    }
    Ok(())
}

pub fn keyboard_content(keyboard: &Keyboard) -> String {
    format!(
        "XKBMODEL=\"{}\"\nXKBLAYOUT=\"{}\"\nXKBVARIANT=\"{}\"\nXKBOPTIONS=\"{}\"\nBACKSPACE=\"{}\"\n",
        keyboard.model, keyboard.layout, keyboard.variant, keyboard.options, keyboard.backspace
    )
}

/// Write /etc/default/keyboard.
pub fn configure_keyboard(root: &SystemRoot, keyboard: &Keyboard) -> Result<()> {
    root.write_file("/etc/default/keyboard", &keyboard_content(keyboard))
}

/// Write /etc/apt/sources.list and disable recommends/suggests.
pub fn configure_apt(
    root: &SystemRoot,
    mirror: &str,
    suite: &str,
    components: &[String],
) -> Result<()> {
    root.write_file(
        "/etc/apt/apt.conf.d/99disable-suggested",
        APT_NO_RECOMMENDS,
    )?;
    root.write_file(
        "/etc/apt/sources.list",
        &format!("deb {} {} {}\n", mirror, suite, components.join(" ")),
    )?;
    Ok(())
}

pub fn fstab_content(boot_uuid: &str, root_uuid: &str) -> String {
    format!(
        "UUID={boot}  /boot/firmware  vfat  defaults          0 2\n\
         UUID={root}  /               ext4  defaults,noatime  0 1\n\
         proc  /proc  proc  defaults  0 0\n",
        boot = boot_uuid,
        root = root_uuid
    )
}

/// Write /etc/fstab mounting boot and root by filesystem UUID.
pub fn write_fstab(root: &SystemRoot, boot_uuid: &str, root_uuid: &str) -> Result<()> {
    root.write_file("/etc/fstab", &fstab_content(boot_uuid, root_uuid))
}

/// Write /etc/vim/vimrc.
pub fn configure_vim(root: &SystemRoot) -> Result<()> {
    root.write_file("/etc/vim/vimrc", VIMRC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_content() {
        assert_eq!(
            locale_content("en_US.UTF-8"),
            "LANG=en_US.UTF-8\nLC_ALL=en_US.UTF-8\nLANGUAGE=en_US:en\n"
        );
        assert!(locale_content("C.UTF-8").ends_with("LANGUAGE=C\n"));
    }

    #[test]
    fn test_enable_locale_gen_uncomments() {
        let content = "# de_DE.UTF-8 UTF-8\n# en_US.UTF-8 UTF-8\n# en_US ISO-8859-1\n";
        let out = enable_locale_gen(content, "en_US.UTF-8").unwrap();
        assert_eq!(
            out,
            "# de_DE.UTF-8 UTF-8\nen_US.UTF-8 UTF-8\n# en_US ISO-8859-1\n"
        );
    }

    #[test]
    fn test_enable_locale_gen_appends_and_is_idempotent() {
        let out = enable_locale_gen("# comment", "nl_NL.UTF-8").unwrap();
        assert_eq!(out, "# comment\nnl_NL.UTF-8 UTF-8\n");
        assert_eq!(enable_locale_gen(&out, "nl_NL.UTF-8").unwrap(), out);
    }

    #[test]
    fn test_enable_locale_gen_requires_charset() {
        let content = "# en_US ISO-8859-1\n";
        let err = enable_locale_gen(content, "en_US").unwrap_err();
        assert!(err.to_string().contains("no charset"));
    }

    #[test]
    fn test_keyboard_content() {
        let content = keyboard_content(&Keyboard::default());
        assert_eq!(
            content,
            "XKBMODEL=\"pc105\"\nXKBLAYOUT=\"us\"\nXKBVARIANT=\"\"\nXKBOPTIONS=\"\"\nBACKSPACE=\"guess\"\n"
        );
    }

    #[test]
    fn test_fstab_content() {
        let fstab = fstab_content("1234-ABCD", "0f0e-uuid");
        let lines: Vec<&str> = fstab.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("UUID=1234-ABCD"));
        assert!(lines[0].contains("/boot/firmware  vfat"));
        assert!(lines[1].contains("ext4  defaults,noatime  0 1"));
        assert!(lines[2].starts_with("proc"));
    }
}
