//! Persisted build status - lets a failed `create` resume where it stopped.
//!
//! Only durable stages are recorded (image allocated, partitions formatted,
//! debootstrap done, configuration applied). Loop devices and mounts are
//! re-acquired on every run and never persisted.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to the image path to form the status file path.
pub const STATUS_SUFFIX: &str = ".rpi-imgbuild-status.json";

/// Durable stages of an image build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ImageCreated,
    Formatted,
    Bootstrapped,
    Configured,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::ImageCreated => "image created",
            Stage::Formatted => "partitions formatted",
            Stage::Bootstrapped => "debootstrap",
            Stage::Configured => "system configured",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    /// Image file this status belongs to.
    pub img_file: Option<PathBuf>,
    #[serde(default)]
    pub image_created: bool,
    #[serde(default)]
    pub formatted: bool,
    #[serde(default)]
    pub bootstrapped: bool,
    #[serde(default)]
    pub configured: bool,
    /// Fingerprint of the debootstrap inputs used when `bootstrapped` was set.
    #[serde(default)]
    pub bootstrap_fingerprint: Option<String>,
}

impl BuildStatus {
    /// Fresh status for `image`.
    pub fn new(image: &Path) -> Self {
        Self {
            img_file: Some(canonical_image_path(image)),
            ..Self::default()
        }
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        match stage {
            Stage::ImageCreated => self.image_created,
            Stage::Formatted => self.formatted,
            Stage::Bootstrapped => self.bootstrapped,
            Stage::Configured => self.configured,
        }
    }

    /// Mark a stage complete.
    pub fn complete(&mut self, stage: Stage) {
        match stage {
            Stage::ImageCreated => self.image_created = true,
            Stage::Formatted => self.formatted = true,
            Stage::Bootstrapped => self.bootstrapped = true,
            Stage::Configured => self.configured = true,
        }
    }

    /// Clear `stage` and every stage after it.
    ///
    /// Redoing an earlier stage destroys whatever later stages produced.
    pub fn invalidate_from(&mut self, stage: Stage) {
        let order = [
            Stage::ImageCreated,
            Stage::Formatted,
            Stage::Bootstrapped,
            Stage::Configured,
        ];
        let mut clearing = false;
        for s in order {
            if s == stage {
                clearing = true;
            }
            if clearing {
                match s {
                    Stage::ImageCreated => self.image_created = false,
                    Stage::Formatted => self.formatted = false,
                    Stage::Bootstrapped => {
                        self.bootstrapped = false;
                        self.bootstrap_fingerprint = None;
                    }
                    Stage::Configured => self.configured = false,
                }
            }
        }
    }

    /// True when every stage is complete.
    pub fn finished(&self) -> bool {
        self.image_created && self.formatted && self.bootstrapped && self.configured
    }
}

/// `image` with its parent directory canonicalized.
///
/// The image itself may not exist yet, so only the directory is resolved.
/// Falls back to `image` unchanged when the directory can't be resolved.
pub fn canonical_image_path(image: &Path) -> PathBuf {
    let (Some(parent), Some(name)) = (image.parent(), image.file_name()) else {
        return image.to_path_buf();
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    match fs::canonicalize(parent) {
        Ok(dir) => dir.join(name),
        Err(_) => image.to_path_buf(),
    }
}

/// Status file path for an image.
pub fn status_path(image: &Path) -> PathBuf {
    let mut name = image
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(STATUS_SUFFIX);
    image.with_file_name(name)
}

/// Load the status recorded for `image`.
///
/// A missing file yields a fresh status. A corrupted file, or one recorded
/// for a different image, is reported and replaced with a fresh status.
pub fn load_status(image: &Path) -> BuildStatus {
    let path = status_path(image);
    if !path.exists() {
        return BuildStatus::new(image);
    }

    let content = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to read status file {}: {} (starting over)",
                path.display(),
                e
            );
            return BuildStatus::new(image);
        }
    };

    let image = canonical_image_path(image);
    match serde_json::from_str::<BuildStatus>(&content) {
        Ok(mut status)
            if status.img_file.as_deref().map(canonical_image_path).as_ref() == Some(&image) =>
        {
            status.img_file = Some(image);
            status
        }
        Ok(status) => {
            eprintln!(
                "  [WARN] Status file {} belongs to {:?}, starting over",
                path.display(),
                status.img_file
            );
            BuildStatus::new(&image)
        }
        Err(e) => {
            eprintln!(
                "  [WARN] Status file {} is corrupted: {} (starting over)",
                path.display(),
                e
            );
            BuildStatus::new(&image)
        }
    }
}

/// Persist the status next to `image`.
pub fn save_status(image: &Path, status: &BuildStatus) -> Result<()> {
    let path = status_path(image);
    let json = serde_json::to_string_pretty(status).context("Failed to serialize build status")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write status file {}", path.display()))?;
    Ok(())
}

/// Remove the status file for `image`. Returns true if one existed.
pub fn remove_status(image: &Path) -> Result<bool> {
    let path = status_path(image);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path)
        .with_context(|| format!("Failed to remove status file {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_path() {
        assert_eq!(
            status_path(Path::new("/tmp/out/pi.img")),
            PathBuf::from("/tmp/out/pi.img.rpi-imgbuild-status.json")
        );
    }

    #[test]
    fn test_missing_status_is_fresh() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");
        let status = load_status(&image);
        assert_eq!(status, BuildStatus::new(&image));
        assert!(!status.is_done(Stage::ImageCreated));
    }

    #[test]
    fn test_save_and_resume() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");

        let mut status = BuildStatus::new(&image);
        status.complete(Stage::ImageCreated);
        status.complete(Stage::Formatted);
        save_status(&image, &status).unwrap();

        let loaded = load_status(&image);
        assert!(loaded.is_done(Stage::Formatted));
        assert!(!loaded.is_done(Stage::Bootstrapped));
    }

    #[test]
    fn test_corrupted_status_starts_over() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");
        fs::write(status_path(&image), "{ not json").unwrap();

        assert_eq!(load_status(&image), BuildStatus::new(&image));
    }

    #[test]
    fn test_status_for_other_image_is_ignored() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");
        let mut other = BuildStatus::new(&dir.path().join("other.img"));
        other.complete(Stage::ImageCreated);
        let json = serde_json::to_string(&other).unwrap();
        fs::write(status_path(&image), json).unwrap();

        assert!(!load_status(&image).is_done(Stage::ImageCreated));
    }

    #[test]
    fn test_same_image_named_two_ways_resumes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let image = dir.path().join("pi.img");
        let mut status = BuildStatus::new(&image);
        status.complete(Stage::ImageCreated);
        status.complete(Stage::Bootstrapped);
        save_status(&image, &status).unwrap();

        let other_spelling = dir.path().join("sub/../pi.img");
        let loaded = load_status(&other_spelling);
        assert!(loaded.is_done(Stage::ImageCreated));
        assert!(loaded.is_done(Stage::Bootstrapped));
    }

    #[test]
    fn test_canonical_image_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let canonical_dir = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(
            canonical_image_path(&dir.path().join("sub/../pi.img")),
            canonical_dir.join("pi.img")
        );
        // Unresolvable directories are left alone.
        assert_eq!(
            canonical_image_path(Path::new("/nonexistent_dir_12345/pi.img")),
            PathBuf::from("/nonexistent_dir_12345/pi.img")
        );
    }

    #[test]
    fn test_invalidate_from_clears_later_stages() {
        let mut status = BuildStatus::new(Path::new("pi.img"));
        for stage in [
            Stage::ImageCreated,
            Stage::Formatted,
            Stage::Bootstrapped,
            Stage::Configured,
        ] {
            status.complete(stage);
        }
        status.bootstrap_fingerprint = Some("abc".to_string());
        assert!(status.finished());

        status.invalidate_from(Stage::Formatted);
        assert!(status.is_done(Stage::ImageCreated));
        assert!(!status.is_done(Stage::Formatted));
        assert!(!status.is_done(Stage::Bootstrapped));
        assert!(!status.is_done(Stage::Configured));
        assert!(status.bootstrap_fingerprint.is_none());
    }

    #[test]
    fn test_remove_status() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("pi.img");
        assert!(!remove_status(&image).unwrap());
        save_status(&image, &BuildStatus::new(&image)).unwrap();
        assert!(remove_status(&image).unwrap());
        assert!(!status_path(&image).exists());
    }
}
