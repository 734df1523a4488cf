pub mod github_store;
pub mod s3_store;

pub use github_store::GithubStore;
pub use s3_store::S3Store;

use crate::config::{Config, LIVE_PHOTO_VIDEO_EXTENSIONS, StorageProvider};
use crate::entities::StorageObject;
use crate::errors::StorageError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Uniform read-only view of the photo backend. Every variant reports the
/// same `StorageObject` semantics; the rest of the pipeline never branches
/// on which backend is behind the trait.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists up to `max_keys` objects under `prefix`, in a stable
    /// backend-defined order.
    async fn list(&self, prefix: &str, max_keys: usize)
    -> Result<Vec<StorageObject>, StorageError>;

    /// Fetches the full object body.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Public URL of the original object.
    fn public_url(&self, key: &str) -> String;

    /// URL the manifest should reference for the photo's thumbnail.
    fn thumbnail_url(&self, key: &str, id: &str) -> String;
}

pub fn make_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.provider {
        StorageProvider::S3 => Ok(Arc::new(S3Store::new(&config.storage)?)),
        StorageProvider::Github => Ok(Arc::new(GithubStore::new(&config.storage)?)),
    }
}

/// Pairs photo objects with motion clips sharing the same directory and
/// basename stem. Returns a map from photo key to the paired video object;
/// the video side never becomes a manifest entry of its own.
pub fn detect_live_photos(objects: &[StorageObject]) -> HashMap<String, StorageObject> {
    let mut videos: HashMap<String, &StorageObject> = HashMap::new();
    for object in objects {
        if let Some(extension) = object.extension() {
            if LIVE_PHOTO_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
                videos.insert(stem_path(&object.key), object);
            }
        }
    }

    if videos.is_empty() {
        return HashMap::new();
    }

    let mut pairs = HashMap::new();
    for object in objects {
        let Some(extension) = object.extension() else {
            continue;
        };
        if LIVE_PHOTO_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }
        if let Some(video) = videos.get(&stem_path(&object.key)) {
            log::debug!("Live photo pair: {} -> {}", object.key, video.key);
            pairs.insert(object.key.clone(), (*video).clone());
        }
    }
    pairs
}

/// Key with the file extension removed; the shared identity of a Live Photo
/// pair.
fn stem_path(key: &str) -> String {
    match key.rfind('/') {
        Some(slash) => {
            let name = &key[slash + 1..];
            match name.rfind('.') {
                Some(dot) if dot > 0 => format!("{}{}", &key[..slash + 1], &name[..dot]),
                _ => key.to_string(),
            }
        }
        None => match key.rfind('.') {
            Some(dot) if dot > 0 => key[..dot].to_string(),
            _ => key.to_string(),
        },
    }
}
