use crate::entities::PhotoRecord;
use crate::errors::PoolError;
use crate::services::photo_processor::Outcome;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a single frame; a batch of records with EXIF trees stays
/// far below this.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

const KIND_READY: u8 = 1;
const KIND_PONG: u8 = 2;
const KIND_BATCH_RESULT: u8 = 3;
const KIND_BATCH_TASK: u8 = 16;
const KIND_PING: u8 = 17;
const KIND_SHUTDOWN: u8 = 18;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub task_id: String,
    pub task_index: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    pub tasks: Vec<TaskAssignment>,
    pub worker_id: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReply {
    pub task_id: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<PhotoRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub results: Vec<TaskReply>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHello {
    pub worker_id: usize,
}

/// Messages flowing coordinator → worker.
#[derive(Clone, Debug)]
pub enum CoordinatorMessage {
    BatchTask(BatchTask),
    Ping,
    Shutdown,
}

/// Messages flowing worker → coordinator.
#[derive(Clone, Debug)]
pub enum WorkerMessage {
    Ready(WorkerHello),
    Pong(WorkerHello),
    BatchResult(BatchResult),
}

impl CoordinatorMessage {
    fn encode(&self) -> Result<(u8, Vec<u8>), PoolError> {
        match self {
            CoordinatorMessage::BatchTask(batch) => Ok((KIND_BATCH_TASK, to_payload(batch)?)),
            CoordinatorMessage::Ping => Ok((KIND_PING, Vec::new())),
            CoordinatorMessage::Shutdown => Ok((KIND_SHUTDOWN, Vec::new())),
        }
    }

    fn decode(kind: u8, payload: &[u8]) -> Result<Self, PoolError> {
        match kind {
            KIND_BATCH_TASK => Ok(CoordinatorMessage::BatchTask(from_payload(payload)?)),
            KIND_PING => Ok(CoordinatorMessage::Ping),
            KIND_SHUTDOWN => Ok(CoordinatorMessage::Shutdown),
            other => Err(PoolError::Protocol(format!(
                "unknown coordinator message kind {}",
                other
            ))),
        }
    }
}

impl WorkerMessage {
    fn encode(&self) -> Result<(u8, Vec<u8>), PoolError> {
        match self {
            WorkerMessage::Ready(hello) => Ok((KIND_READY, to_payload(hello)?)),
            WorkerMessage::Pong(hello) => Ok((KIND_PONG, to_payload(hello)?)),
            WorkerMessage::BatchResult(batch) => Ok((KIND_BATCH_RESULT, to_payload(batch)?)),
        }
    }

    fn decode(kind: u8, payload: &[u8]) -> Result<Self, PoolError> {
        match kind {
            KIND_READY => Ok(WorkerMessage::Ready(from_payload(payload)?)),
            KIND_PONG => Ok(WorkerMessage::Pong(from_payload(payload)?)),
            KIND_BATCH_RESULT => Ok(WorkerMessage::BatchResult(from_payload(payload)?)),
            other => Err(PoolError::Protocol(format!(
                "unknown worker message kind {}",
                other
            ))),
        }
    }
}

pub async fn write_coordinator_message<W>(
    writer: &mut W,
    message: &CoordinatorMessage,
) -> Result<(), PoolError>
where
    W: AsyncWrite + Unpin,
{
    let (kind, payload) = message.encode()?;
    write_frame(writer, kind, &payload).await
}

pub async fn write_worker_message<W>(
    writer: &mut W,
    message: &WorkerMessage,
) -> Result<(), PoolError>
where
    W: AsyncWrite + Unpin,
{
    let (kind, payload) = message.encode()?;
    write_frame(writer, kind, &payload).await
}

/// Reads the next coordinator frame; `None` on clean end-of-stream.
pub async fn read_coordinator_message<R>(
    reader: &mut R,
) -> Result<Option<CoordinatorMessage>, PoolError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some((kind, payload)) => Ok(Some(CoordinatorMessage::decode(kind, &payload)?)),
        None => Ok(None),
    }
}

/// Reads the next worker frame; `None` on clean end-of-stream.
pub async fn read_worker_message<R>(reader: &mut R) -> Result<Option<WorkerMessage>, PoolError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some((kind, payload)) => Ok(Some(WorkerMessage::decode(kind, &payload)?)),
        None => Ok(None),
    }
}

/// Frame layout: u32 little-endian body length, then a version byte, a kind
/// byte and the JSON payload.
async fn write_frame<W>(writer: &mut W, kind: u8, payload: &[u8]) -> Result<(), PoolError>
where
    W: AsyncWrite + Unpin,
{
    let body_len = (payload.len() + 2) as u32;
    writer
        .write_all(&body_len.to_le_bytes())
        .await
        .map_err(io_error)?;
    writer
        .write_all(&[PROTOCOL_VERSION, kind])
        .await
        .map_err(io_error)?;
    writer.write_all(payload).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)?;
    Ok(())
}

async fn read_frame<R>(reader: &mut R) -> Result<Option<(u8, Vec<u8>)>, PoolError>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    match reader.read_exact(&mut length_bytes).await {
        Ok(_) => {}
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(error) => return Err(io_error(error)),
    }

    let body_len = u32::from_le_bytes(length_bytes);
    if body_len < 2 || body_len > MAX_FRAME_BYTES {
        return Err(PoolError::Protocol(format!(
            "frame length {} out of range",
            body_len
        )));
    }

    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await.map_err(io_error)?;
    let [version, kind] = header;
    if version != PROTOCOL_VERSION {
        return Err(PoolError::Protocol(format!(
            "unsupported protocol version {}",
            version
        )));
    }

    let mut payload = vec![0u8; body_len as usize - 2];
    reader.read_exact(&mut payload).await.map_err(io_error)?;
    Ok(Some((kind, payload)))
}

fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, PoolError> {
    serde_json::to_vec(value).map_err(|error| PoolError::Protocol(error.to_string()))
}

fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, PoolError> {
    serde_json::from_slice(payload).map_err(|error| PoolError::Protocol(error.to_string()))
}

fn io_error(error: std::io::Error) -> PoolError {
    PoolError::Protocol(error.to_string())
}

/// Task ids carry the index so replies resolve to their result slot without
/// coordinator-side bookkeeping keyed on the id itself.
pub fn make_task_id(worker_id: usize, task_index: usize, sequence: u64) -> String {
    format!(
        "{}-{}-{}-{}",
        worker_id,
        task_index,
        chrono::Utc::now().timestamp_millis(),
        sequence
    )
}

pub fn parse_task_index(task_id: &str) -> Option<usize> {
    task_id.split('-').nth(1)?.parse().ok()
}
