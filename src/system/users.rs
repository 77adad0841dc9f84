//! Root account password.

use anyhow::{bail, Result};
use regex::{NoExpand, Regex};

use super::SystemRoot;
use crate::process::Cmd;

const SHADOW: &str = "/etc/shadow";

/// `openssl passwd` reading the password from stdin, keeping it out of the
/// process list.
fn hash_command(password: &str) -> Cmd {
    Cmd::new("openssl")
        .args(["passwd", "-5", "-stdin"])
        .stdin(format!("{}\n", password))
}

/// SHA-256 crypt hash (`$5$...`) of `password` with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    if password.contains('\n') {
        bail!("Root password must not contain a newline");
    }
    let result = hash_command(password)
        .error_msg("openssl passwd failed")
        .run()?;
    let hash = result.stdout_trimmed();
    if !hash.starts_with("$5$") {
        bail!("openssl passwd returned an unexpected hash format");
    }
    Ok(hash.to_string())
}

/// Replace root's password field in shadow content.
pub fn replace_root_hash(shadow: &str, hash: &str) -> Result<String> {
    let re = Regex::new(r"(?m)^root:[^:\n]*:")?;
    if !re.is_match(shadow) {
        bail!("No root entry in {}", SHADOW);
    }
    let replacement = format!("root:{}:", hash);
    Ok(re.replacen(shadow, 1, NoExpand(&replacement)).into_owned())
}

/// Set the root password in the system's /etc/shadow.
pub fn change_root_password(root: &SystemRoot, password: &str) -> Result<()> {
    if password.is_empty() {
        bail!("Refusing to set an empty root password");
    }
    println!("Setting root password...");
    let hash = hash_password(password)?;
    let shadow = root.read_file(SHADOW)?;
    root.write_file(SHADOW, &replace_root_hash(&shadow, &hash)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_locked_root() {
        let shadow = "root:*:19000:0:99999:7:::\ndaemon:*:19000:0:99999:7:::\n";
        let out = replace_root_hash(shadow, "$5$salt$hash").unwrap();
        assert_eq!(
            out,
            "root:$5$salt$hash:19000:0:99999:7:::\ndaemon:*:19000:0:99999:7:::\n"
        );
    }

    #[test]
    fn test_replace_existing_hash() {
        let shadow = "root:$6$old$value:19000:0:99999:7:::\n";
        let out = replace_root_hash(shadow, "$5$new$h").unwrap();
        assert!(out.starts_with("root:$5$new$h:19000"));
    }

    #[test]
    fn test_password_not_on_command_line() {
        let cmd = hash_command("hunter2");
        assert_eq!(cmd.get_args(), &["passwd", "-5", "-stdin"]);
        assert!(!cmd.describe().contains("hunter2"));
    }

    #[test]
    fn test_missing_root_entry() {
        assert!(replace_root_hash("daemon:*:1:::::\n", "$5$x$y").is_err());
    }
}
