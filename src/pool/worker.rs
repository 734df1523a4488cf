use crate::config::{Config, ForceFlags};
use crate::entities::{PhotoRecord, StorageObject};
use crate::pool::protocol::{
    self, BatchResult, BatchTask, CoordinatorMessage, TaskReply, WorkerHello, WorkerMessage,
};
use crate::services::photo_processor::{Outcome, PhotoProcessor};
use crate::services::ManifestStore;
use crate::storage::{detect_live_photos, make_store};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, mpsc};

pub const DEFAULT_TASK_CONCURRENCY: usize = 5;

/// State built lazily on the first batch: the open store, the filtered
/// listing, a read-only manifest snapshot and the live-photo map. Keeping it
/// out of startup lets the coordinator probe readiness before any network
/// traffic happens.
struct WorkerState {
    processor: PhotoProcessor,
    objects: Vec<StorageObject>,
    existing: HashMap<String, PhotoRecord>,
    live_photos: HashMap<String, StorageObject>,
}

/// Entry point for a process running in worker mode. Speaks the framed
/// protocol over stdin/stdout; the frame loop itself never blocks on photo
/// work.
pub async fn run(config: Config) -> Result<()> {
    let worker_id: usize = std::env::var("WORKER_ID")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_TASK_CONCURRENCY)
        .max(1);
    let flags = ForceFlags::from_env();

    let mut stdin = tokio::io::stdin();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            if let Err(error) = protocol::write_worker_message(&mut stdout, &message).await {
                log::error!("Worker {} failed to write frame: {}", worker_id, error);
                break;
            }
        }
    });

    out_tx
        .send(WorkerMessage::Ready(WorkerHello { worker_id }))
        .ok();
    log::debug!("Worker {} online", worker_id);

    let state: Arc<OnceCell<WorkerState>> = Arc::new(OnceCell::new());
    let config = Arc::new(config);

    loop {
        let message = match protocol::read_coordinator_message(&mut stdin).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(error) => {
                log::error!("Worker {} protocol error: {}", worker_id, error);
                break;
            }
        };

        match message {
            CoordinatorMessage::Ping => {
                out_tx
                    .send(WorkerMessage::Pong(WorkerHello { worker_id }))
                    .ok();
            }
            CoordinatorMessage::Shutdown => {
                log::debug!("Worker {} shutting down", worker_id);
                break;
            }
            CoordinatorMessage::BatchTask(batch) => {
                let state = Arc::clone(&state);
                let config = Arc::clone(&config);
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    let result = run_batch(&state, &config, flags, batch, concurrency).await;
                    out_tx.send(WorkerMessage::BatchResult(result)).ok();
                });
            }
        }
    }

    drop(out_tx);
    writer.await.ok();
    Ok(())
}

/// Executes the batch with at most `concurrency` tasks in flight; the batch
/// size itself is already bounded by the coordinator's per-worker window.
async fn run_batch(
    state: &OnceCell<WorkerState>,
    config: &Config,
    flags: ForceFlags,
    batch: BatchTask,
    concurrency: usize,
) -> BatchResult {
    let state = match state
        .get_or_try_init(|| async { init_state(config, flags).await })
        .await
    {
        Ok(state) => state,
        Err(error) => {
            log::error!("Worker initialization failed: {:#}", error);
            let results = batch
                .tasks
                .into_iter()
                .map(|task| TaskReply {
                    task_id: task.task_id,
                    outcome: Outcome::Failed,
                    record: None,
                    error: Some(format!("worker initialization failed: {:#}", error)),
                })
                .collect();
            return BatchResult { results };
        }
    };

    let total = state.objects.len();
    let replies = stream::iter(batch.tasks.into_iter().map(|task| async move {
        let Some(object) = state.objects.get(task.task_index) else {
            return TaskReply {
                task_id: task.task_id,
                outcome: Outcome::Failed,
                record: None,
                error: Some(format!("task index {} out of range", task.task_index)),
            };
        };

        let result = state
            .processor
            .process(
                object,
                task.task_index,
                total,
                state.existing.get(&object.key),
                state.live_photos.get(&object.key),
            )
            .await;

        TaskReply {
            task_id: task.task_id,
            outcome: result.outcome,
            record: result.record,
            error: None,
        }
    }));

    BatchResult {
        results: replies.buffered(concurrency).collect::<Vec<_>>().await,
    }
}

async fn init_state(config: &Config, flags: ForceFlags) -> Result<WorkerState> {
    let store = make_store(config).context("opening storage backend")?;

    let all = crate::builder::list_all_objects(store.as_ref(), config)
        .await
        .context("listing storage backend")?;
    let objects = crate::builder::filter_image_objects(&all, config);

    let existing = if flags.all || flags.manifest {
        HashMap::new()
    } else {
        let manifest = ManifestStore::new(config.manifest_path(), config.thumbnail_dir());
        manifest
            .load()
            .unwrap_or_default()
            .into_iter()
            .map(|record| (record.s3_key.clone(), record))
            .collect()
    };

    let live_photos = if config.options.enable_live_photo_detection {
        detect_live_photos(&all)
    } else {
        HashMap::new()
    };

    let processor = PhotoProcessor::new(store, config, flags);
    Ok(WorkerState {
        processor,
        objects,
        existing,
        live_photos,
    })
}
