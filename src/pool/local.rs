use crate::entities::{PhotoRecord, StorageObject};
use crate::services::photo_processor::{PhotoProcessor, ProcessResult};

use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-process fallback used when cluster mode is off: the same per-photo
/// processor, driven on the coordinator's runtime with a bounded number of
/// photos in flight.
pub async fn run_local(
    processor: Arc<PhotoProcessor>,
    objects: &[StorageObject],
    existing: &HashMap<String, PhotoRecord>,
    live_photos: &HashMap<String, StorageObject>,
    concurrency: usize,
) -> Vec<ProcessResult> {
    let total = objects.len();
    let mut results: Vec<Option<ProcessResult>> = vec![None; total];

    let mut outcomes = stream::iter(objects.iter().enumerate())
        .map(|(index, object)| {
            let processor = Arc::clone(&processor);
            async move {
                let result = processor
                    .process(
                        object,
                        index,
                        total,
                        existing.get(&object.key),
                        live_photos.get(&object.key),
                    )
                    .await;
                (index, result)
            }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((index, result)) = outcomes.next().await {
        results[index] = Some(result);
    }

    results
        .into_iter()
        .map(|slot| slot.expect("every task yields a result"))
        .collect()
}
