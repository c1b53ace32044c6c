//! Resource-manager collaborator seam.
//!
//! `ResourceManagerClient` is the boundary a real YARN/Kubernetes/whatever
//! RM integration plugs into; outside this spec's scope (non-goal (a)), so
//! only a stub lives here. The communicator task owns the priority-ordered
//! `AskQueue` the scheduler module defines and drains `RmEvent`s forwarded
//! by the dispatcher, translating RM responses back into bus events for
//! the entities that asked.

use am_common::ids::{ContainerId, NodeId, TaskAttemptId};
use am_core::{CompletionStatus, ContainerEvent, Event, ResourceSpec, RmEvent, TaskAttemptEvent};
use am_engine::{scheduler::AskQueue, EventBus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// A resource-manager client: requests and releases containers. Every
/// method returns the bus events the grant/release produces rather than
/// mutating anything itself, so the communicator (not this trait) is what
/// talks to the dispatcher.
#[async_trait]
pub trait ResourceManagerClient: Send + Sync {
    async fn request_container(&self, attempt: TaskAttemptId, priority: i32, resource: ResourceSpec) -> Vec<Event>;

    async fn deallocate_container(&self, container: ContainerId) -> Vec<Event>;
}

/// Grants every ask immediately against a monotonically increasing
/// container id, on `localhost`. Stands in for a real RM client in tests
/// and local runs.
pub struct StubResourceManagerClient {
    next_id: AtomicU64,
}

impl StubResourceManagerClient {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }
}

impl Default for StubResourceManagerClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManagerClient for StubResourceManagerClient {
    async fn request_container(&self, attempt: TaskAttemptId, _priority: i32, resource: ResourceSpec) -> Vec<Event> {
        let container = ContainerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let node = NodeId { host: "localhost".into(), port: 0 };
        let _ = node;
        // `LaunchRequest` must reach the container before `ContainerAssigned`
        // reaches the attempt — the container auto-vivifies `Allocated` on
        // the former and needs to already be `Launching` by the time
        // `AssignTa` (emitted by the attempt transition below) arrives.
        vec![
            Event::Container(container, ContainerEvent::LaunchRequest { resource, credentials: None }),
            Event::TaskAttempt(attempt, TaskAttemptEvent::ContainerAssigned { container }),
        ]
    }

    async fn deallocate_container(&self, container: ContainerId) -> Vec<Event> {
        vec![Event::Container(container, ContainerEvent::Completed { status: CompletionStatus::Killed, preempted: false })]
    }
}

/// Drain `rm_rx` for the lifetime of the process, keeping the priority
/// queue of pending asks and calling into `client` for every ask/deallocate
/// the dispatcher forwards.
///
/// `ContainerGranted`/`ContainerCompleted`/`NodeFailed` never arrive here
/// from the engine side — those are the shapes a real RM's own callback API
/// delivers on its own connection, translated directly into bus events by
/// whatever client plugs in at this seam. The stub never produces them out
/// of band, so they are simply logged if ever observed.
pub async fn run_rm_communicator(mut rx: mpsc::UnboundedReceiver<RmEvent>, bus: EventBus, client: Arc<dyn ResourceManagerClient>) {
    let mut asks = AskQueue::new();
    let mut pending_resources: HashMap<TaskAttemptId, ResourceSpec> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            RmEvent::ContainerAsk { attempt, priority, resource } => {
                pending_resources.insert(attempt, resource);
                asks.push(attempt, priority);
            }
            RmEvent::ContainerDeallocate { container } => {
                for ev in client.deallocate_container(container).await {
                    bus.handle(ev);
                }
                continue;
            }
            RmEvent::ContainerGranted { .. } | RmEvent::ContainerCompleted { .. } | RmEvent::NodeFailed { .. } => {
                debug!("rm callback notification observed on the ask channel; no-op for the stub client");
                continue;
            }
        }

        // The stub always grants, so draining immediately keeps the queue
        // empty; a capacity-limited client would leave unfulfilled asks
        // queued here across iterations instead.
        while let Some((attempt, priority)) = asks.pop() {
            let Some(resource) = pending_resources.remove(&attempt) else { continue };
            for ev in client.request_container(attempt, priority, resource).await {
                bus.handle(ev);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, DagId, TaskId, VertexId};
    use am_core::ContainerState;
    use am_engine::Registry;
    use std::sync::Arc;

    fn attempt() -> TaskAttemptId {
        let vertex = VertexId { dag: DagId { app: ApplicationId(1), dag: 0 }, vertex: 0 };
        TaskAttemptId::new(TaskId::new(vertex, 0), 0)
    }

    #[tokio::test]
    async fn a_granted_ask_launches_a_container_and_assigns_the_attempt() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher, channels) = am_engine::new_bus(registry.clone(), am_common::config::AmConfig::default());
        registry.attempts.insert(attempt(), am_core::TaskAttempt::new(attempt(), false));
        if let Some(mut a) = registry.attempts.get_mut(&attempt()) {
            a.state = am_core::TaskAttemptState::StartWait;
        }

        tokio::spawn(dispatcher.run());
        let client: Arc<dyn ResourceManagerClient> = Arc::new(StubResourceManagerClient::new());
        tokio::spawn(run_rm_communicator(channels.rm_rx, bus.clone(), client));

        bus.handle(Event::Rm(RmEvent::ContainerAsk {
            attempt: attempt(),
            priority: 2,
            resource: ResourceSpec { memory_mb: 1024, vcores: 1 },
        }));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(registry.containers.len(), 1);
        let container = registry.containers.iter().next().unwrap();
        assert_eq!(container.state, ContainerState::Launching);
        assert_eq!(container.queued, Some(attempt()));
    }
}
