use crate::config::{Config, ForceFlags};
use crate::entities::{PhotoInfo, PhotoRecord, StorageObject};
use crate::services::codec_service::{CodecService, apply_orientation, is_heic_key};
use crate::services::exif_service::ExifService;
use crate::services::thumbnail_service::ThumbnailService;
use crate::storage::ObjectStore;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::task;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    New,
    Processed,
    Skipped,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessResult {
    pub outcome: Outcome,
    pub record: Option<PhotoRecord>,
}

impl ProcessResult {
    fn failed() -> Self {
        Self {
            outcome: Outcome::Failed,
            record: None,
        }
    }
}

/// Per-photo orchestration: decides what can be reused from the previous
/// run, fetches and decodes the original, generates the thumbnail and
/// blurhash, extracts EXIF and assembles the manifest record. Failures stay
/// scoped to the photo; the pipeline itself never aborts here.
pub struct PhotoProcessor {
    store: Arc<dyn ObjectStore>,
    codec: CodecService,
    exif: ExifService,
    thumbnails: ThumbnailService,
    prefix: String,
    flags: ForceFlags,
    enable_cache: bool,
    show_progress: bool,
}

impl PhotoProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config, flags: ForceFlags) -> Self {
        Self {
            store,
            codec: CodecService::new(),
            exif: ExifService::new(),
            thumbnails: ThumbnailService::new(config.thumbnail_dir()),
            prefix: config.effective_prefix().to_string(),
            flags,
            enable_cache: config.performance.enable_cache,
            show_progress: config.options.show_progress,
        }
    }

    pub async fn process(
        &self,
        object: &StorageObject,
        index: usize,
        total: usize,
        existing: Option<&PhotoRecord>,
        live_video: Option<&StorageObject>,
    ) -> ProcessResult {
        let id = object.stem().to_string();

        if self.can_skip(object, existing, &id) {
            self.log_progress(index, total, "skipped", &object.key);
            return ProcessResult {
                outcome: Outcome::Skipped,
                record: existing.cloned(),
            };
        }

        match self.rebuild(object, &id, existing, live_video).await {
            Ok(record) => {
                let outcome = if existing.is_some() {
                    Outcome::Processed
                } else {
                    Outcome::New
                };
                self.log_progress(
                    index,
                    total,
                    if outcome == Outcome::New {
                        "new"
                    } else {
                        "processed"
                    },
                    &object.key,
                );
                ProcessResult {
                    outcome,
                    record: Some(record),
                }
            }
            Err(error) => {
                log::error!("Processing {} failed: {:#}", object.key, error);
                ProcessResult::failed()
            }
        }
    }

    /// First row of the reuse table: nothing about the photo changed and its
    /// thumbnail is still on disk, so the previous record is reused whole.
    fn can_skip(&self, object: &StorageObject, existing: Option<&PhotoRecord>, id: &str) -> bool {
        if !self.enable_cache || self.flags.all || self.flags.manifest || self.flags.thumbnails {
            return false;
        }
        let Some(existing) = existing else {
            return false;
        };
        object.last_modified <= existing.last_modified && self.thumbnails.thumbnail_path(id).exists()
    }

    async fn rebuild(
        &self,
        object: &StorageObject,
        id: &str,
        existing: Option<&PhotoRecord>,
        live_video: Option<&StorageObject>,
    ) -> Result<PhotoRecord> {
        let original = Arc::new(
            self.store
                .get(&object.key)
                .await
                .with_context(|| format!("fetching {}", object.key))?,
        );

        let transcoded = is_heic_key(&object.key);
        let processed: Arc<Vec<u8>> = {
            let codec = self.codec.clone();
            let original = Arc::clone(&original);
            let key = object.key.clone();
            task::spawn_blocking(move || {
                codec
                    .preprocess(&original, &key)
                    .map(|bytes| match bytes {
                        Cow::Borrowed(_) => Arc::clone(&original),
                        Cow::Owned(owned) => Arc::new(owned),
                    })
            })
            .await
            .context("preprocess task join error")??
        };

        let meta = self
            .codec
            .probe(&processed)
            .with_context(|| format!("probing {}", object.key))?;
        let (width, height) = apply_orientation(meta.width, meta.height, meta.orientation);

        let (thumbnail_url, blurhash) = self
            .thumbnail_facet(object, id, existing, &processed, meta.orientation)
            .await;

        let exif = self
            .exif_facet(existing, &processed, &original, transcoded)
            .await;

        let info = PhotoInfo::from_key(&object.key, &self.prefix);
        let date_taken = exif
            .as_ref()
            .and_then(ExifService::date_taken)
            .or(info.date)
            .unwrap_or_else(Utc::now);

        Ok(PhotoRecord {
            id: id.to_string(),
            title: info.title,
            description: String::new(),
            date_taken,
            views: info.views,
            tags: info.tags,
            original_url: self.store.public_url(&object.key),
            thumbnail_url,
            blurhash,
            width,
            height,
            aspect_ratio: if height > 0 {
                width as f64 / height as f64
            } else {
                0.0
            },
            s3_key: object.key.clone(),
            last_modified: object.last_modified,
            size: object.size,
            exif,
            is_live_photo: live_video.is_some(),
            live_photo_video_url: live_video.map(|video| self.store.public_url(&video.key)),
            live_photo_video_s3_key: live_video.map(|video| video.key.clone()),
        })
    }

    /// Second row of the reuse table: a valid blurhash plus an on-disk
    /// thumbnail short-circuits regeneration. Otherwise the thumbnail is
    /// rebuilt, forced when the source is newer than the cached record.
    async fn thumbnail_facet(
        &self,
        object: &StorageObject,
        id: &str,
        existing: Option<&PhotoRecord>,
        processed: &Arc<Vec<u8>>,
        orientation: u16,
    ) -> (Option<String>, Option<String>) {
        let thumbnail_exists = self.thumbnails.thumbnail_path(id).exists();

        if !self.flags.all && !self.flags.thumbnails && thumbnail_exists {
            if let Some(hash) = existing.and_then(|record| record.blurhash.clone()) {
                return (
                    Some(self.store.thumbnail_url(&object.key, id)),
                    Some(hash),
                );
            }
        }

        // Without a cached record (first sight, or a manifest-only rebuild)
        // an on-disk thumbnail is still trusted and reused.
        let source_newer = existing
            .map(|record| object.last_modified > record.last_modified)
            .unwrap_or(false);
        let force = self.flags.all || self.flags.thumbnails || source_newer;

        let generator = self.thumbnails.clone();
        let bytes = Arc::clone(processed);
        let task_id = id.to_string();
        let generated = task::spawn_blocking(move || {
            generator.generate(&bytes, &task_id, orientation, force)
        })
        .await;

        match generated {
            Ok(Ok(output)) => (
                Some(self.store.thumbnail_url(&object.key, id)),
                output.blurhash,
            ),
            Ok(Err(error)) => {
                log::warn!("Thumbnail generation failed for {}: {}", object.key, error);
                (None, None)
            }
            Err(error) => {
                log::warn!("Thumbnail task for {} did not complete: {}", object.key, error);
                (None, None)
            }
        }
    }

    /// Third row of the reuse table: cached EXIF survives unless a force
    /// mode invalidates it. HEIC sources fall back to the original bytes
    /// because transcoding may have dropped the EXIF block.
    async fn exif_facet(
        &self,
        existing: Option<&PhotoRecord>,
        processed: &Arc<Vec<u8>>,
        original: &Arc<Vec<u8>>,
        transcoded: bool,
    ) -> Option<crate::entities::ExifGroup> {
        if !self.flags.all && !self.flags.manifest {
            if let Some(cached) = existing.and_then(|record| record.exif.clone()) {
                return Some(cached);
            }
        }

        let service = self.exif;
        let processed = Arc::clone(processed);
        let original = transcoded.then(|| Arc::clone(original));
        let extraction = task::spawn_blocking(move || {
            service.extract(&processed, original.as_deref().map(Vec::as_slice))
        })
        .await;

        match extraction {
            Ok(exif) => exif,
            Err(error) => {
                log::warn!("EXIF extraction task failed: {}", error);
                None
            }
        }
    }

    fn log_progress(&self, index: usize, total: usize, outcome: &str, key: &str) {
        if self.show_progress {
            log::info!("[{}/{}] {} {}", index + 1, total, outcome, key);
        }
    }
}
