//! Bus-owned entity registries. Cross-entity references are id-only; any
//! code that needs an entity's current record looks it up here rather than
//! holding a pointer, per the id-only cross-reference rule.

use am_common::ids::{ContainerId, DagId, TaskAttemptId, TaskId, VertexId};
use am_core::{Container, Dag, Task, TaskAttempt, TezEvent, Vertex, VertexManager};
use dashmap::DashMap;
use tokio::sync::oneshot;

/// All live entities the dispatcher addresses events to.
#[derive(Default)]
pub struct Registry {
    pub containers: DashMap<ContainerId, Container>,
    pub attempts: DashMap<TaskAttemptId, TaskAttempt>,
    pub tasks: DashMap<TaskId, Task>,
    pub vertices: DashMap<VertexId, Vertex>,
    pub dags: DashMap<DagId, Dag>,
    /// One boxed plugin instance per vertex, keyed by vertex id.
    pub vertex_managers: DashMap<VertexId, Box<dyn VertexManager>>,
    /// Per-task outbound event queue: data-movement and related events
    /// routed to a consumer task, pulled by the worker's next heartbeat.
    pub task_event_queues: DashMap<TaskId, Vec<TezEvent>>,
    /// `canCommit` callers block on a reply; the dispatcher resolves it
    /// the moment the task's commit decision lands on the bus, keeping
    /// the decision itself made on the single dispatch thread.
    pub pending_commit_replies: DashMap<TaskAttemptId, oneshot::Sender<bool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(completed, total)` task counts for `vertex`, used by vertex
    /// manager plugins to gate task release on upstream progress.
    pub fn upstream_counts(&self, vertex: VertexId) -> (u32, u32) {
        self.vertices
            .get(&vertex)
            .map(|v| (v.completed, v.tasks.len() as u32))
            .unwrap_or((0, 0))
    }

    /// Append an event to `task`'s outbound queue.
    pub fn push_task_event(&self, task: TaskId, event: TezEvent) {
        self.task_event_queues.entry(task).or_default().push(event);
    }

    /// `(events, total_queue_len)` starting at `start_index`, capped at
    /// `max_events` — the slice `heartbeat` ships back to the worker.
    pub fn drain_task_events(&self, task: TaskId, start_index: usize, max_events: usize) -> (Vec<TezEvent>, usize) {
        let Some(queue) = self.task_event_queues.get(&task) else {
            return (Vec::new(), 0);
        };
        let total = queue.len();
        if start_index >= total {
            return (Vec::new(), total);
        }
        let end = (start_index + max_events).min(total);
        (queue[start_index..end].to_vec(), total)
    }
}
