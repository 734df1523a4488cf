use crate::config::{Config, ForceFlags};
use crate::errors::PoolError;
use crate::pool::protocol::{
    self, BatchTask, CoordinatorMessage, TaskAssignment, WorkerMessage, make_task_id,
    parse_task_index,
};
use crate::pool::worker::DEFAULT_TASK_CONCURRENCY;
use crate::services::photo_processor::{Outcome, ProcessResult};

use std::collections::{HashSet, VecDeque};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout, timeout_at};

const READY_TIMEOUT_SECS: u64 = 10;

/// Never spawn more workers than the task count warrants.
pub fn workers_to_start(requested: usize, total_tasks: usize, task_concurrency: usize) -> usize {
    if total_tasks == 0 {
        return 0;
    }
    requested
        .min(total_tasks.div_ceil(task_concurrency.max(1)))
        .max(1)
}

enum Event {
    Message(usize, WorkerMessage),
    Disconnected(usize),
}

struct WorkerHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    ready: bool,
    alive: bool,
    pending: usize,
    in_flight: HashSet<usize>,
}

/// Runs `total_tasks` photo tasks across a pool of respawned worker
/// processes. Owns the queue, the per-worker windows and the dense result
/// slots; workers own the decoded bytes. Tasks are dispatched at most once.
pub struct ClusterPool {
    workers: Vec<WorkerHandle>,
    queue: VecDeque<usize>,
    results: Vec<Option<ProcessResult>>,
    completed: usize,
    task_concurrency: usize,
    sequence: u64,
    shutdown_grace: Duration,
}

impl ClusterPool {
    pub async fn run(
        config: &Config,
        flags: ForceFlags,
        total_tasks: usize,
        requested_workers: usize,
    ) -> Result<Vec<ProcessResult>, PoolError> {
        if total_tasks == 0 {
            return Ok(Vec::new());
        }

        let task_concurrency = DEFAULT_TASK_CONCURRENCY;
        let worker_count = workers_to_start(requested_workers, total_tasks, task_concurrency);
        log::info!(
            "Starting {} worker(s) for {} photo task(s), {} per worker in flight",
            worker_count,
            total_tasks,
            task_concurrency
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            workers.push(spawn_worker(worker_id, flags, task_concurrency, &event_tx)?);
        }
        drop(event_tx);

        let mut pool = Self {
            workers,
            queue: (0..total_tasks).collect(),
            results: vec![None; total_tasks],
            completed: 0,
            task_concurrency,
            sequence: 0,
            shutdown_grace: Duration::from_millis(config.performance.worker.timeout),
        };

        let outcome = pool.event_loop(event_rx).await;
        pool.shutdown().await;
        outcome?;

        Ok(pool
            .results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or(ProcessResult {
                    outcome: Outcome::Failed,
                    record: None,
                })
            })
            .collect())
    }

    async fn event_loop(
        &mut self,
        mut event_rx: mpsc::UnboundedReceiver<Event>,
    ) -> Result<(), PoolError> {
        let ready_deadline = Instant::now() + Duration::from_secs(READY_TIMEOUT_SECS);

        while self.completed < self.results.len() {
            let waiting_for_ready = self.workers.iter().any(|w| w.alive && !w.ready);
            let event = if waiting_for_ready {
                match timeout_at(ready_deadline, event_rx.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        let lagging = self
                            .workers
                            .iter()
                            .position(|w| w.alive && !w.ready)
                            .unwrap_or(0);
                        return Err(PoolError::StartupTimeout(lagging, READY_TIMEOUT_SECS));
                    }
                }
            } else {
                event_rx.recv().await
            };

            let Some(event) = event else {
                return Err(PoolError::Protocol(
                    "all worker channels closed before completion".to_string(),
                ));
            };

            match event {
                Event::Message(worker_id, WorkerMessage::Ready(_))
                | Event::Message(worker_id, WorkerMessage::Pong(_)) => {
                    self.workers[worker_id].ready = true;
                    self.top_up(worker_id).await;
                }
                Event::Message(worker_id, WorkerMessage::BatchResult(batch)) => {
                    let replied = batch.results.len();
                    self.workers[worker_id].pending =
                        self.workers[worker_id].pending.saturating_sub(replied);

                    for reply in batch.results {
                        let Some(task_index) = parse_task_index(&reply.task_id) else {
                            log::warn!("Discarding reply with malformed task id {}", reply.task_id);
                            continue;
                        };
                        self.workers[worker_id].in_flight.remove(&task_index);
                        if let Some(error) = &reply.error {
                            log::warn!("Task {} failed in worker {}: {}", task_index, worker_id, error);
                        }
                        self.deposit(
                            task_index,
                            ProcessResult {
                                outcome: reply.outcome,
                                record: reply.record,
                            },
                        );
                    }
                    self.top_up(worker_id).await;
                }
                Event::Disconnected(worker_id) => self.handle_disconnect(worker_id),
            }
        }
        Ok(())
    }

    fn deposit(&mut self, task_index: usize, result: ProcessResult) {
        if task_index >= self.results.len() {
            log::warn!("Discarding reply for out-of-range task {}", task_index);
            return;
        }
        if self.results[task_index].is_none() {
            self.completed += 1;
        }
        self.results[task_index] = Some(result);
    }

    /// Fills the worker's window back up to `task_concurrency` with a single
    /// batch frame.
    async fn top_up(&mut self, worker_id: usize) {
        let message = {
            let Self {
                workers,
                queue,
                sequence,
                task_concurrency,
                ..
            } = self;
            let worker = &mut workers[worker_id];
            if !worker.alive || !worker.ready {
                return;
            }
            let available = task_concurrency.saturating_sub(worker.pending);
            let count = available.min(queue.len());
            if count == 0 {
                return;
            }

            let mut tasks = Vec::with_capacity(count);
            for _ in 0..count {
                let task_index = queue.pop_front().expect("queue length checked");
                *sequence += 1;
                worker.in_flight.insert(task_index);
                tasks.push(TaskAssignment {
                    task_id: make_task_id(worker_id, task_index, *sequence),
                    task_index,
                });
            }
            worker.pending += count;
            CoordinatorMessage::BatchTask(BatchTask { tasks, worker_id })
        };
        let write_failed = match self.workers[worker_id].stdin.as_mut() {
            Some(stdin) => protocol::write_coordinator_message(stdin, &message)
                .await
                .is_err(),
            None => true,
        };
        if write_failed {
            log::error!("Failed to dispatch batch to worker {}", worker_id);
            self.handle_disconnect(worker_id);
        }
    }

    /// A worker vanished mid-run. Its in-flight tasks are failed rather than
    /// re-issued, keeping dispatch at-most-once; the run continues on the
    /// remaining workers.
    fn handle_disconnect(&mut self, worker_id: usize) {
        let worker = &mut self.workers[worker_id];
        if !worker.alive {
            return;
        }
        worker.alive = false;
        worker.stdin = None;
        worker.pending = 0;

        let held: Vec<usize> = worker.in_flight.drain().collect();
        if !held.is_empty() {
            log::error!(
                "Worker {} exited unexpectedly; failing {} in-flight task(s)",
                worker_id,
                held.len()
            );
            for task_index in held {
                self.deposit(
                    task_index,
                    ProcessResult {
                        outcome: Outcome::Failed,
                        record: None,
                    },
                );
            }
        } else {
            log::error!("Worker {} exited unexpectedly", worker_id);
        }

        if self.workers.iter().all(|w| !w.alive) {
            while let Some(task_index) = self.queue.pop_front() {
                self.deposit(
                    task_index,
                    ProcessResult {
                        outcome: Outcome::Failed,
                        record: None,
                    },
                );
            }
        }
    }

    /// Graceful shutdown: a shutdown frame, then a bounded wait, then a
    /// kill.
    async fn shutdown(&mut self) {
        for (worker_id, worker) in self.workers.iter_mut().enumerate() {
            if let Some(stdin) = worker.stdin.as_mut() {
                let _ =
                    protocol::write_coordinator_message(stdin, &CoordinatorMessage::Shutdown).await;
            }
            worker.stdin = None;

            match timeout(self.shutdown_grace, worker.child.wait()).await {
                Ok(Ok(status)) => {
                    log::debug!("Worker {} exited with {}", worker_id, status);
                }
                Ok(Err(error)) => {
                    log::warn!("Waiting for worker {} failed: {}", worker_id, error);
                }
                Err(_) => {
                    log::warn!("Worker {} ignored shutdown; killing it", worker_id);
                    let _ = worker.child.start_kill();
                    let _ = worker.child.wait().await;
                }
            }
        }
    }
}

fn spawn_worker(
    worker_id: usize,
    flags: ForceFlags,
    task_concurrency: usize,
    event_tx: &mpsc::UnboundedSender<Event>,
) -> Result<WorkerHandle, PoolError> {
    let exe = std::env::current_exe().map_err(|error| PoolError::Spawn(worker_id, error))?;
    let mut command = Command::new(exe);
    command
        .arg("--cluster-worker")
        .env("CLUSTER_WORKER", "true")
        .env("WORKER_ID", worker_id.to_string())
        .env("WORKER_CONCURRENCY", task_concurrency.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    flags.export_env(&mut command);

    let mut child = command
        .spawn()
        .map_err(|error| PoolError::Spawn(worker_id, error))?;
    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PoolError::Protocol(format!("worker {} has no stdout", worker_id)))?;

    let event_tx = event_tx.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        loop {
            match protocol::read_worker_message(&mut reader).await {
                Ok(Some(message)) => {
                    if event_tx.send(Event::Message(worker_id, message)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = event_tx.send(Event::Disconnected(worker_id));
                    break;
                }
                Err(error) => {
                    log::error!("Worker {} stream error: {}", worker_id, error);
                    let _ = event_tx.send(Event::Disconnected(worker_id));
                    break;
                }
            }
        }
    });

    Ok(WorkerHandle {
        child,
        stdin,
        ready: false,
        alive: true,
        pending: 0,
        in_flight: HashSet::new(),
    })
}
