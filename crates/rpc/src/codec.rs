//! Wire envelope and length-prefixed binary framing for the worker RPC
//! surface: a `u32` big-endian length prefix followed by a
//! `bincode`-encoded [`Request`]/[`Response`].

use am_common::ids::{ContainerId, TaskAttemptId};
use am_core::{Credentials, ResourceKey, TezEvent};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerContext {
    pub container_id: ContainerId,
    pub pid: u32,
    pub hostname: String,
}

/// The task handed back by `getTask` on a queued assignment: enough to
/// identify which attempt and vertex/task index the worker should run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub attempt: TaskAttemptId,
    pub vertex_name: String,
    pub task_index: u32,
}

/// `getTask` response. `task: None` with `should_die: false` is the "valid
/// but empty container" case; `should_die: true` is the sentinel "invalid
/// JVM" case and `task` is always `None` alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerTask {
    pub task: Option<TaskDescriptor>,
    pub additional_resources: Vec<ResourceKey>,
    pub credentials: Option<Credentials>,
    pub credentials_changed: bool,
    pub should_die: bool,
}

impl ContainerTask {
    pub fn die() -> Self {
        Self { task: None, additional_resources: Vec::new(), credentials: None, credentials_changed: false, should_die: true }
    }

    pub fn empty() -> Self {
        Self { task: None, additional_resources: Vec::new(), credentials: None, credentials_changed: false, should_die: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub container_id: ContainerId,
    pub request_id: i64,
    pub current_attempt_id: Option<TaskAttemptId>,
    pub events: Vec<TezEvent>,
    pub events_start_index: usize,
    pub max_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub last_request_id: i64,
    pub events: Vec<TezEvent>,
    pub should_die: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    GetTask(ContainerContext),
    CanCommit(TaskAttemptId),
    Heartbeat(HeartbeatRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    GetTask(ContainerTask),
    CanCommit(bool),
    Heartbeat(HeartbeatResponse),
    /// A sequence error or other RPC-level failure; the worker that
    /// receives one does not die (that's `should_die` on the happy-path
    /// variants), it simply retries.
    Error(String),
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(req)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request, bincode::Error> {
    bincode::deserialize(bytes)
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(resp)
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, bincode::Error> {
    bincode::deserialize(bytes)
}

/// Wrap a connection in the length-prefixed binary framing every worker RPC
/// call travels over.
pub fn framed<T: AsyncRead + AsyncWrite + Unpin>(io: T) -> Framed<T, LengthDelimitedCodec> {
    LengthDelimitedCodec::builder().length_field_type::<u32>().big_endian().new_framed(io)
}
