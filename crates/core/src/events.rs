//! The event family every component communicates through.
//!
//! An `Event` is always `(subject, kind, payload)`: the subject carries the
//! id of the entity the dispatcher should route it to. State machines never
//! call each other directly — they only ever emit further `Event`s back
//! onto the bus, which is what keeps cross-entity references id-only.

use crate::model::{Credentials, ResourceKey, ResourceSpec};
use crate::wire::TezEvent;
use am_common::ids::{ContainerId, DagId, NodeId, TaskAttemptId, TaskId, VertexId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Succeeded,
    Failed,
    Killed,
}

/// Events addressed to a `Container`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ContainerEvent {
    LaunchRequest { resource: ResourceSpec, credentials: Option<Credentials> },
    AssignTa {
        attempt: TaskAttemptId,
        dag: DagId,
        resources: Vec<ResourceKey>,
        credentials: Option<Credentials>,
    },
    Launched,
    PullTask,
    TaSucceeded,
    Completed { status: CompletionStatus, preempted: bool },
    NodeFailed,
    TimedOut,
    NmStopFailed,
    NmStopSent,
}

/// Events addressed to a `TaskAttempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskAttemptEvent {
    Schedule { priority: i32 },
    ContainerAssigned { container: ContainerId },
    StartedRemotely,
    ContainerTerminating,
    ContainerTerminated,
    ContainerPreempted,
    NodeFailed,
    Failed { diagnostics: String },
    CommitPending,
    CommitGranted,
    CommitDenied,
    Succeeded,
    Killed,
}

/// Events addressed to a `Task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    ScheduleFirstAttempt,
    AttemptSucceeded { attempt: TaskAttemptId },
    /// `chargeable` is false for preemption: the attempt is rescheduled
    /// without consuming `max_attempts` budget.
    AttemptFailed { attempt: TaskAttemptId, retryable: bool, chargeable: bool },
    AttemptKilled { attempt: TaskAttemptId },
    CanCommit { attempt: TaskAttemptId },
}

/// Events addressed to a `Vertex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VertexEvent {
    Start,
    SourceTaskCompleted { source_vertex: VertexId, task_index: u32 },
    TaskSucceeded { task: TaskId },
    TaskFailed { task: TaskId },
    TaskKilled { task: TaskId },
    ManagerEvent { payload: Vec<u8> },
    RouteEvent { from_attempt: TaskAttemptId, event: TezEvent },
    ScheduleTasks { indices: Vec<u32> },
}

/// Events addressed to a `Dag`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DagEvent {
    Start,
    VertexSucceeded { vertex: VertexId },
    VertexFailed { vertex: VertexId },
    VertexKilled { vertex: VertexId },
}

/// Events addressed to the resource-manager communicator (no single entity
/// owns these; they carry their own ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RmEvent {
    ContainerAsk { attempt: TaskAttemptId, priority: i32, resource: ResourceSpec },
    ContainerDeallocate { container: ContainerId },
    ContainerGranted { container: ContainerId, node: NodeId, resource: ResourceSpec },
    ContainerCompleted { container: ContainerId, status: CompletionStatus, preempted: bool },
    NodeFailed { node: NodeId },
}

/// Events addressed to the node-manager communicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NmEvent {
    LaunchRequest {
        container: ContainerId,
        resource: ResourceSpec,
        credentials: Option<Credentials>,
        launch_command: String,
    },
    StopRequest { container: ContainerId },
}

/// The top-level sum type routed by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Container(ContainerId, ContainerEvent),
    TaskAttempt(TaskAttemptId, TaskAttemptEvent),
    Task(TaskId, TaskEvent),
    Vertex(VertexId, VertexEvent),
    Dag(DagId, DagEvent),
    Rm(RmEvent),
    Nm(NmEvent),
}

impl Event {
    /// A stable label for metrics and log lines; never used for matching.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Container(_, e) => match e {
                ContainerEvent::LaunchRequest { .. } => "container.launch_request",
                ContainerEvent::AssignTa { .. } => "container.assign_ta",
                ContainerEvent::Launched => "container.launched",
                ContainerEvent::PullTask => "container.pull_task",
                ContainerEvent::TaSucceeded => "container.ta_succeeded",
                ContainerEvent::Completed { .. } => "container.completed",
                ContainerEvent::NodeFailed => "container.node_failed",
                ContainerEvent::TimedOut => "container.timed_out",
                ContainerEvent::NmStopFailed => "container.nm_stop_failed",
                ContainerEvent::NmStopSent => "container.nm_stop_sent",
            },
            Event::TaskAttempt(_, e) => match e {
                TaskAttemptEvent::Schedule { .. } => "attempt.schedule",
                TaskAttemptEvent::ContainerAssigned { .. } => "attempt.container_assigned",
                TaskAttemptEvent::StartedRemotely => "attempt.started_remotely",
                TaskAttemptEvent::ContainerTerminating => "attempt.container_terminating",
                TaskAttemptEvent::ContainerTerminated => "attempt.container_terminated",
                TaskAttemptEvent::ContainerPreempted => "attempt.container_preempted",
                TaskAttemptEvent::NodeFailed => "attempt.node_failed",
                TaskAttemptEvent::Failed { .. } => "attempt.failed",
                TaskAttemptEvent::CommitPending => "attempt.commit_pending",
                TaskAttemptEvent::CommitGranted => "attempt.commit_granted",
                TaskAttemptEvent::CommitDenied => "attempt.commit_denied",
                TaskAttemptEvent::Succeeded => "attempt.succeeded",
                TaskAttemptEvent::Killed => "attempt.killed",
            },
            Event::Task(_, e) => match e {
                TaskEvent::ScheduleFirstAttempt => "task.schedule_first_attempt",
                TaskEvent::AttemptSucceeded { .. } => "task.attempt_succeeded",
                TaskEvent::AttemptFailed { .. } => "task.attempt_failed",
                TaskEvent::AttemptKilled { .. } => "task.attempt_killed",
                TaskEvent::CanCommit { .. } => "task.can_commit",
            },
            Event::Vertex(_, e) => match e {
                VertexEvent::Start => "vertex.start",
                VertexEvent::SourceTaskCompleted { .. } => "vertex.source_task_completed",
                VertexEvent::TaskSucceeded { .. } => "vertex.task_succeeded",
                VertexEvent::TaskFailed { .. } => "vertex.task_failed",
                VertexEvent::TaskKilled { .. } => "vertex.task_killed",
                VertexEvent::ManagerEvent { .. } => "vertex.manager_event",
                VertexEvent::RouteEvent { .. } => "vertex.route_event",
                VertexEvent::ScheduleTasks { .. } => "vertex.schedule_tasks",
            },
            Event::Dag(_, e) => match e {
                DagEvent::Start => "dag.start",
                DagEvent::VertexSucceeded { .. } => "dag.vertex_succeeded",
                DagEvent::VertexFailed { .. } => "dag.vertex_failed",
                DagEvent::VertexKilled { .. } => "dag.vertex_killed",
            },
            Event::Rm(e) => match e {
                RmEvent::ContainerAsk { .. } => "rm.container_ask",
                RmEvent::ContainerDeallocate { .. } => "rm.container_deallocate",
                RmEvent::ContainerGranted { .. } => "rm.container_granted",
                RmEvent::ContainerCompleted { .. } => "rm.container_completed",
                RmEvent::NodeFailed { .. } => "rm.node_failed",
            },
            Event::Nm(e) => match e {
                NmEvent::LaunchRequest { .. } => "nm.launch_request",
                NmEvent::StopRequest { .. } => "nm.stop_request",
            },
        }
    }
}
