use crate::entities::PhotoRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Loads and persists the manifest document and removes thumbnails whose
/// records have gone away. The document on disk is a UTF-8 JSON array with
/// two-space indentation and a trailing newline.
#[derive(Clone, Debug)]
pub struct ManifestStore {
    manifest_path: PathBuf,
    thumbnail_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(manifest_path: PathBuf, thumbnail_dir: PathBuf) -> Self {
        Self {
            manifest_path,
            thumbnail_dir,
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Reads the current manifest; a missing file is an empty manifest.
    pub fn load(&self) -> Result<Vec<PhotoRecord>> {
        if !self.manifest_path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.manifest_path).with_context(|| {
            format!("failed to read manifest {}", self.manifest_path.display())
        })?;
        serde_json::from_str(&text).with_context(|| {
            format!("manifest {} is not valid JSON", self.manifest_path.display())
        })
    }

    /// Serializes and writes the manifest through a temp file and rename, so
    /// a failed run leaves the previous document intact.
    pub fn save(&self, records: &[PhotoRecord]) -> std::io::Result<()> {
        let mut body = serde_json::to_vec_pretty(records).map_err(std::io::Error::other)?;
        body.push(b'\n');

        if let Some(parent) = self.manifest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.manifest_path.with_extension("json.tmp");
        fs::write(&temp, &body)?;
        fs::rename(&temp, &self.manifest_path)
    }

    /// Best-effort removal of an orphaned thumbnail; a missing file is not
    /// an error.
    pub fn delete_thumbnail(&self, id: &str) {
        let path = self.thumbnail_dir.join(format!("{}.webp", id));
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed orphaned thumbnail {}", path.display()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => log::warn!("Could not remove thumbnail {}: {}", path.display(), error),
        }
    }
}
