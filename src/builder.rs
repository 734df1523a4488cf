use crate::config::{Config, ForceFlags};
use crate::entities::{PhotoRecord, StorageObject};
use crate::errors::{BuildError, StorageError};
use crate::pool::{ClusterPool, local};
use crate::services::photo_processor::{Outcome, PhotoProcessor, ProcessResult};
use crate::services::ManifestStore;
use crate::storage::{ObjectStore, detect_live_photos, make_store};

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub new: usize,
    pub processed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Clone, Debug)]
pub struct BuildSummary {
    pub stats: BuildStats,
    pub manifest_path: PathBuf,
    pub photo_count: usize,
}

/// Full listing as the backend reports it, capped at `max_photos` keys.
pub async fn list_all_objects(
    store: &dyn ObjectStore,
    config: &Config,
) -> Result<Vec<StorageObject>, StorageError> {
    store
        .list(config.effective_prefix(), config.options.max_photos)
        .await
}

/// Image objects in deterministic key order. Worker processes rebuild this
/// same list, so a task index resolves to the same photo everywhere.
pub fn filter_image_objects(all: &[StorageObject], config: &Config) -> Vec<StorageObject> {
    let mut images: Vec<StorageObject> = all
        .iter()
        .filter(|object| config.is_supported_format(&object.key))
        .cloned()
        .collect();
    images.sort_by(|a, b| a.key.cmp(&b.key));
    images
}

/// One incremental build against the configured backend.
pub async fn run_build(
    config: &Config,
    flags: ForceFlags,
    requested_workers: Option<usize>,
) -> Result<BuildSummary> {
    let store = make_store(config).context("opening storage backend")?;
    run_build_with_store(config, flags, requested_workers, store).await
}

/// One incremental build: list, pair, diff against the previous manifest,
/// dispatch per-photo work, reconcile deletions and persist the new
/// document atomically.
pub async fn run_build_with_store(
    config: &Config,
    flags: ForceFlags,
    requested_workers: Option<usize>,
    store: Arc<dyn ObjectStore>,
) -> Result<BuildSummary> {
    let manifest_store = ManifestStore::new(config.manifest_path(), config.thumbnail_dir());

    let old_manifest = if flags.all || flags.manifest {
        Vec::new()
    } else {
        match manifest_store.load() {
            Ok(records) => records,
            Err(error) => {
                log::warn!("Could not load existing manifest, starting fresh: {:#}", error);
                Vec::new()
            }
        }
    };
    let existing: HashMap<String, PhotoRecord> = old_manifest
        .iter()
        .map(|record| (record.s3_key.clone(), record.clone()))
        .collect();

    let all = list_all_objects(store.as_ref(), config)
        .await
        .map_err(BuildError::Listing)?;
    let images = filter_image_objects(&all, config);
    log::info!(
        "Backend listing: {} object(s), {} photo(s)",
        all.len(),
        images.len()
    );

    let live_photos = if config.options.enable_live_photo_detection {
        detect_live_photos(&all)
    } else {
        HashMap::new()
    };
    if !live_photos.is_empty() {
        log::info!("Detected {} live photo pair(s)", live_photos.len());
    }

    let listed_keys: HashSet<&str> = all.iter().map(|object| object.key.as_str()).collect();

    let results = dispatch(config, flags, requested_workers, &store, &images, &existing, &live_photos).await?;

    let mut stats = BuildStats::default();
    let mut records: Vec<PhotoRecord> = Vec::with_capacity(images.len());
    let mut seen_ids: HashMap<String, String> = HashMap::new();

    for (object, result) in images.iter().zip(results) {
        match (result.outcome, result.record) {
            (Outcome::Failed, _) | (_, None) => stats.failed += 1,
            (outcome, Some(record)) => {
                if let Some(first) = seen_ids.insert(record.id.clone(), record.s3_key.clone()) {
                    return Err(BuildError::DuplicateId {
                        id: record.id,
                        first,
                        second: object.key.clone(),
                    }
                    .into());
                }
                match outcome {
                    Outcome::New => stats.new += 1,
                    Outcome::Processed => stats.processed += 1,
                    Outcome::Skipped => stats.skipped += 1,
                    Outcome::Failed => unreachable!("failed handled above"),
                }
                records.push(record);
            }
        }
    }

    if !flags.all && !flags.manifest {
        for record in &old_manifest {
            if !listed_keys.contains(record.s3_key.as_str()) {
                log::info!("Removing {} (gone from backend)", record.s3_key);
                manifest_store.delete_thumbnail(&record.id);
                stats.deleted += 1;
            }
        }
    }

    records.sort_by(|a, b| a.manifest_order(b));

    let photo_count = records.len();
    manifest_store
        .save(&records)
        .map_err(BuildError::ManifestWrite)?;

    report(config, &stats, photo_count, &manifest_store);

    Ok(BuildSummary {
        stats,
        manifest_path: manifest_store.manifest_path().to_path_buf(),
        photo_count,
    })
}

async fn dispatch(
    config: &Config,
    flags: ForceFlags,
    requested_workers: Option<usize>,
    store: &Arc<dyn ObjectStore>,
    images: &[StorageObject],
    existing: &HashMap<String, PhotoRecord>,
    live_photos: &HashMap<String, StorageObject>,
) -> Result<Vec<ProcessResult>> {
    if config.performance.worker.use_cluster_mode {
        let worker_count = requested_workers.unwrap_or(config.performance.worker.max_workers);
        let results = ClusterPool::run(config, flags, images.len(), worker_count).await?;
        Ok(results)
    } else {
        let processor = Arc::new(PhotoProcessor::new(Arc::clone(store), config, flags));
        Ok(local::run_local(
            processor,
            images,
            existing,
            live_photos,
            config.options.default_concurrency,
        )
        .await)
    }
}

fn report(config: &Config, stats: &BuildStats, photo_count: usize, manifest_store: &ManifestStore) {
    log::info!(
        "Build complete: {} new, {} processed, {} skipped, {} deleted, {} failed",
        stats.new,
        stats.processed,
        stats.skipped,
        stats.deleted,
        stats.failed
    );
    if config.options.show_detailed_stats {
        log::info!(
            "Manifest now lists {} photo(s) at {}",
            photo_count,
            manifest_store.manifest_path().display()
        );
    }
}
