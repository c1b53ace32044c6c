//! Task-attempt listener: the three worker-facing RPCs, `getTask`,
//! `canCommit`, `heartbeat`, exactly as spec'd — idempotent with respect to
//! retried calls.
//!
//! Registered state lives in two maps, per the "per-container monitor"
//! discipline: `containers` (`ContainerId -> containerInfo`, each entry
//! guarded by its own `parking_lot::Mutex` so sequence validation and
//! response caching are atomic) and `attempt_containers` (`attemptId ->
//! containerId`, a lock-free read side written only alongside its
//! container's monitor). Neither table is ever touched by a state machine;
//! RPC handlers only read the registry and emit events onto the bus.

use am_common::error::Error;
use am_common::ids::{ContainerId, TaskAttemptId};
use am_core::{ContainerEvent, ContainerState, Event, TaskAttemptEvent, TaskEvent, VertexEvent};
use am_engine::{EventBus, Registry};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::warn;

use crate::codec::{ContainerContext, ContainerTask, HeartbeatRequest, HeartbeatResponse, TaskDescriptor};

struct ContainerInfo {
    last_request_id: i64,
    last_response: Option<HeartbeatResponse>,
    current_attempt_id: Option<TaskAttemptId>,
    last_heartbeat_at: Instant,
}

impl ContainerInfo {
    fn new() -> Self {
        Self { last_request_id: 0, last_response: None, current_attempt_id: None, last_heartbeat_at: Instant::now() }
    }
}

fn container_is_dead(state: ContainerState, is_in_error_state: bool) -> bool {
    is_in_error_state
        || matches!(state, ContainerState::StopRequested | ContainerState::Stopping | ContainerState::Completed)
}

pub struct TaskAttemptListener {
    registry: Arc<Registry>,
    bus: EventBus,
    containers: DashMap<ContainerId, Mutex<ContainerInfo>>,
    attempt_containers: DashMap<TaskAttemptId, ContainerId>,
}

impl TaskAttemptListener {
    pub fn new(registry: Arc<Registry>, bus: EventBus) -> Self {
        Self { registry, bus, containers: DashMap::new(), attempt_containers: DashMap::new() }
    }

    /// Seed the listener's tables for a freshly granted container, before
    /// its worker ever calls in. The RM communicator calls this the moment
    /// it translates a grant into a `LAUNCH_REQUEST`.
    pub fn register_container(&self, container: ContainerId) {
        self.containers.entry(container).or_insert_with(|| Mutex::new(ContainerInfo::new()));
    }

    /// `getTask(containerContext) -> ContainerTask`.
    pub fn get_task(&self, ctx: ContainerContext) -> ContainerTask {
        if self.containers.get(&ctx.container_id).is_none() {
            warn!(container = %ctx.container_id, "getTask for a container the listener never registered");
            return ContainerTask::die();
        }

        let Some(mut container) = self.registry.containers.get_mut(&ctx.container_id) else {
            warn!(container = %ctx.container_id, "getTask for a container missing from the registry");
            return ContainerTask::die();
        };
        if container_is_dead(container.state, container.is_in_error_state) {
            return ContainerTask::die();
        }

        let Some(attempt) = container.queued else {
            return ContainerTask::empty();
        };

        let vertex_name = self.registry.vertices.get(&attempt.task.vertex).map(|v| v.name.clone()).unwrap_or_default();
        let resources = container.pending_resource_delta.clone();
        let credentials_changed = container.credentials_changed;
        let credentials = if credentials_changed { container.credentials.clone() } else { None };
        drop(container);

        self.attempt_containers.insert(attempt, ctx.container_id);
        if let Some(entry) = self.containers.get(&ctx.container_id) {
            entry.value().lock().current_attempt_id = Some(attempt);
        }

        self.bus.handle(Event::Container(ctx.container_id, ContainerEvent::PullTask));
        self.bus.handle(Event::TaskAttempt(attempt, TaskAttemptEvent::StartedRemotely));

        ContainerTask {
            task: Some(TaskDescriptor { attempt, vertex_name, task_index: attempt.task.index }),
            additional_resources: resources,
            credentials,
            credentials_changed,
            should_die: false,
        }
    }

    /// `canCommit(attemptId) -> bool`. Parks a oneshot reply keyed by
    /// `attempt`, resolved by the dispatcher the instant the task's
    /// single-threaded grant decision is made; never touches `Task`
    /// state from this RPC-handling task directly.
    pub async fn can_commit(&self, attempt: TaskAttemptId) -> bool {
        let (tx, rx) = oneshot::channel();
        self.registry.pending_commit_replies.insert(attempt, tx);
        self.bus.handle(Event::TaskAttempt(attempt, TaskAttemptEvent::CommitPending));
        self.bus.handle(Event::Task(attempt.task, TaskEvent::CanCommit { attempt }));
        rx.await.unwrap_or(false)
    }

    /// `heartbeat(request) -> response`, sequenced by `requestId`.
    pub fn heartbeat(&self, req: HeartbeatRequest) -> Result<HeartbeatResponse, Error> {
        let Some(entry) = self.containers.get(&req.container_id) else {
            return Err(Error::Rpc(format!("heartbeat for unregistered container {}", req.container_id)));
        };
        let mut info = entry.value().lock();
        info.last_heartbeat_at = Instant::now();

        if req.request_id == info.last_request_id {
            if let Some(cached) = &info.last_response {
                return Ok(cached.clone());
            }
        }
        if req.request_id != info.last_request_id + 1 {
            return Err(Error::Rpc(format!(
                "bad heartbeat sequence for {}: expected {}, got {}",
                req.container_id,
                info.last_request_id + 1,
                req.request_id
            )));
        }

        info.current_attempt_id = req.current_attempt_id;

        if let Some(attempt) = req.current_attempt_id {
            for event in req.events {
                self.bus.handle(Event::Vertex(attempt.task.vertex, VertexEvent::RouteEvent { from_attempt: attempt, event }));
            }
        }

        let events = req
            .current_attempt_id
            .map(|attempt| self.registry.drain_task_events(attempt.task, req.events_start_index, req.max_events).0)
            .unwrap_or_default();

        let should_die = self
            .registry
            .containers
            .get(&req.container_id)
            .map(|c| container_is_dead(c.state, c.is_in_error_state))
            .unwrap_or(true);

        let response = HeartbeatResponse { last_request_id: req.request_id, events, should_die };
        info.last_request_id = req.request_id;
        info.last_response = Some(response.clone());
        Ok(response)
    }

    /// Poll every registered container's last heartbeat and emit
    /// `ContainerEvent::TimedOut` for any that has gone silent past
    /// `timeout`. Runs for the lifetime of the process; one task, not one
    /// per container, matching the bus-owned-watchdog shape.
    pub async fn run_watchdog(self: Arc<Self>, timeout: Duration, check_interval: Duration) {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            for entry in self.containers.iter() {
                let container_id = *entry.key();
                let elapsed = now.duration_since(entry.value().lock().last_heartbeat_at);
                if elapsed <= timeout {
                    continue;
                }
                let dead = self
                    .registry
                    .containers
                    .get(&container_id)
                    .map(|c| container_is_dead(c.state, c.is_in_error_state))
                    .unwrap_or(true);
                if !dead {
                    warn!(container = %container_id, elapsed_ms = elapsed.as_millis(), "heartbeat timeout");
                    self.bus.handle(Event::Container(container_id, ContainerEvent::TimedOut));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, DagId, TaskId, VertexId};
    use am_core::{Container, ContainerState, NodeId, ResourceSpec, Task, Vertex, VertexManagerDescriptor, VertexState};
    use std::sync::Arc;

    fn vertex_id() -> VertexId {
        VertexId { dag: DagId { app: ApplicationId(1), dag: 0 }, vertex: 0 }
    }

    fn attempt_id(n: u32) -> TaskAttemptId {
        TaskAttemptId::new(TaskId::new(vertex_id(), 0), n)
    }

    fn setup() -> (Arc<Registry>, TaskAttemptListener, ContainerId) {
        let registry = Arc::new(Registry::new());
        let (bus, _dispatcher, _channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        let container_id = ContainerId(1);

        registry.vertices.insert(
            vertex_id(),
            Vertex {
                id: vertex_id(),
                name: "v0".into(),
                state: VertexState::Running,
                resource: ResourceSpec { memory_mb: 1024, vcores: 1 },
                parallelism: Some(1),
                distance_from_root: 0,
                vertex_manager: VertexManagerDescriptor { name: "ImmediateStart".into(), user_payload: vec![] },
                tasks: vec![TaskId::new(vertex_id(), 0)],
                completed: 0,
                running: 0,
                killed: 0,
                failed: 0,
                failure_tolerance: 0.0,
                output_commits: true,
            },
        );
        registry.tasks.insert(TaskId::new(vertex_id(), 0), Task::new(TaskId::new(vertex_id(), 0), 4, true));

        let mut container = Container::new(container_id, NodeId { host: "h".into(), port: 1 }, ResourceSpec { memory_mb: 1024, vcores: 1 });
        container.state = ContainerState::Idle;
        container.queued = Some(attempt_id(0));
        registry.containers.insert(container_id, container);

        let listener = TaskAttemptListener::new(registry.clone(), bus);
        listener.register_container(container_id);
        (registry, listener, container_id)
    }

    #[test]
    fn get_task_for_unregistered_container_says_die() {
        let registry = Arc::new(Registry::new());
        let (bus, _dispatcher, _channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        let listener = TaskAttemptListener::new(registry, bus);
        let task = listener.get_task(ContainerContext { container_id: ContainerId(99), pid: 1, hostname: "h".into() });
        assert!(task.should_die);
        assert!(task.task.is_none());
    }

    #[test]
    fn get_task_on_queued_assignment_returns_the_task_and_registers_attempt() {
        let (_registry, listener, container_id) = setup();
        let task = listener.get_task(ContainerContext { container_id, pid: 1, hostname: "h".into() });
        assert!(!task.should_die);
        let descriptor = task.task.expect("a task should have been queued");
        assert_eq!(descriptor.attempt, attempt_id(0));
        assert_eq!(descriptor.vertex_name, "v0");
        assert!(listener.attempt_containers.get(&attempt_id(0)).is_some());
    }

    #[test]
    fn get_task_on_empty_container_returns_no_task_and_does_not_die() {
        let registry = Arc::new(Registry::new());
        let (bus, _dispatcher, _channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        let container_id = ContainerId(2);
        let mut container = Container::new(container_id, NodeId { host: "h".into(), port: 1 }, ResourceSpec { memory_mb: 1, vcores: 1 });
        container.state = ContainerState::Idle;
        registry.containers.insert(container_id, container);
        let listener = TaskAttemptListener::new(registry, bus);
        listener.register_container(container_id);

        let task = listener.get_task(ContainerContext { container_id, pid: 1, hostname: "h".into() });
        assert!(!task.should_die);
        assert!(task.task.is_none());
    }

    #[test]
    fn heartbeat_replay_of_the_same_request_id_is_byte_identical() {
        let (_registry, listener, container_id) = setup();
        let req = HeartbeatRequest {
            container_id,
            request_id: 1,
            current_attempt_id: None,
            events: vec![],
            events_start_index: 0,
            max_events: 10,
        };
        let first = listener.heartbeat(req.clone()).unwrap();
        let second = listener.heartbeat(req).unwrap();
        assert_eq!(first.last_request_id, second.last_request_id);
        assert_eq!(first.events, second.events);
        assert_eq!(first.should_die, second.should_die);
    }

    #[test]
    fn heartbeat_out_of_sequence_request_id_is_rejected() {
        let (_registry, listener, container_id) = setup();
        let req = HeartbeatRequest {
            container_id,
            request_id: 5,
            current_attempt_id: None,
            events: vec![],
            events_start_index: 0,
            max_events: 10,
        };
        assert!(listener.heartbeat(req).is_err());
    }

    #[test]
    fn heartbeat_with_no_current_attempt_is_a_liveness_ping() {
        let (_registry, listener, container_id) = setup();
        let req = HeartbeatRequest {
            container_id,
            request_id: 1,
            current_attempt_id: None,
            events: vec![],
            events_start_index: 0,
            max_events: 10,
        };
        let resp = listener.heartbeat(req).unwrap();
        assert!(resp.events.is_empty());
    }

    #[tokio::test]
    async fn watchdog_times_out_a_silent_container() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher, _channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        let container_id = ContainerId(1);
        let mut container = Container::new(container_id, NodeId { host: "h".into(), port: 1 }, ResourceSpec { memory_mb: 1, vcores: 1 });
        container.state = ContainerState::Running;
        registry.containers.insert(container_id, container);

        let listener = Arc::new(TaskAttemptListener::new(registry.clone(), bus));
        listener.register_container(container_id);
        tokio::spawn(dispatcher.run());
        tokio::spawn(listener.clone().run_watchdog(Duration::from_millis(5), Duration::from_millis(2)));

        tokio::time::sleep(Duration::from_millis(50)).await;

        let container = registry.containers.get(&container_id).unwrap();
        assert_eq!(container.state, ContainerState::StopRequested);
    }

    #[tokio::test]
    async fn can_commit_races_resolve_to_exactly_one_winner() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher, _channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        let task_id = TaskId::new(vertex_id(), 0);
        registry.tasks.insert(task_id, Task::new(task_id, 4, true));
        let listener = Arc::new(TaskAttemptListener::new(registry, bus));
        tokio::spawn(dispatcher.run());

        let a0 = attempt_id(0);
        let a1 = attempt_id(1);
        let l0 = listener.clone();
        let l1 = listener.clone();
        let (r0, r1) = tokio::join!(tokio::spawn(async move { l0.can_commit(a0).await }), tokio::spawn(async move { l1.can_commit(a1).await }));
        let r0 = r0.unwrap();
        let r1 = r1.unwrap();
        assert!(r0 != r1, "exactly one of the two concurrent callers should win commit");
    }
}
