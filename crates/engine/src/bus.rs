//! The event bus: an unbounded MPSC queue and a single dispatch task that
//! drains it, routing each event by subject id to the matching state
//! machine and re-enqueuing whatever events that transition emits.
//!
//! Handlers are never concurrent with respect to each other — there is
//! exactly one dispatch task — which is what lets every `*_sm` module stay
//! a synchronous, non-blocking function of `(entity, event)`.

use am_common::config::AmConfig;
use am_common::ids::{ContainerId, DagId, NodeId, TaskAttemptId, TaskId, VertexId};
use am_common::metrics;
use am_core::{
    edge_manager_by_name, vertex_manager_by_name, Container, ContainerEvent, DagEvent, Event,
    ImmediateStartVertexManager, NmEvent, ResourceSpec, RmEvent, TaskAttempt, TaskAttemptEvent,
    TaskEvent, TezEvent, VertexEvent, VertexState,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use crate::registry::Registry;
use crate::scheduler::base_priority;
use crate::{attempt_sm, container_sm, dag_sm, task_sm, vertex_sm};

/// The handle every producer (RPC listener, RM/NM communicators, the CLI
/// submission path) holds to enqueue events onto the bus.
#[derive(Clone)]
pub struct EventBus {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    pub fn handle(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("dispatcher is no longer running; dropping event");
        }
    }
}

/// The single dispatch task. Owns the registry exclusively; nothing else
/// mutates entity state.
pub struct Dispatcher {
    registry: Arc<Registry>,
    profile: AmConfig,
    receiver: mpsc::UnboundedReceiver<Event>,
    sender: mpsc::UnboundedSender<Event>,
    rm_tx: mpsc::UnboundedSender<RmEvent>,
    nm_tx: mpsc::UnboundedSender<NmEvent>,
}

/// The receiving ends of the RM/NM side channels. `Event::Rm`/`Event::Nm`
/// are addressed to no entity the dispatcher owns — it forwards them here
/// for the resource-manager and node-manager communicators to drain on
/// their own dedicated tasks, per the "no single entity owns these"
/// note on [`am_core::RmEvent`]/[`am_core::NmEvent`].
pub struct CommunicatorChannels {
    pub rm_rx: mpsc::UnboundedReceiver<RmEvent>,
    pub nm_rx: mpsc::UnboundedReceiver<NmEvent>,
}

/// Construct a bus/dispatcher pair sharing one registry, plus the RM/NM
/// communicator channels.
pub fn new(registry: Arc<Registry>, profile: AmConfig) -> (EventBus, Dispatcher, CommunicatorChannels) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (rm_tx, rm_rx) = mpsc::unbounded_channel();
    let (nm_tx, nm_rx) = mpsc::unbounded_channel();
    let bus = EventBus { sender: sender.clone() };
    let dispatcher = Dispatcher { registry, profile, receiver, sender, rm_tx, nm_tx };
    (bus, dispatcher, CommunicatorChannels { rm_rx, nm_rx })
}

impl Dispatcher {
    /// Drain the queue until every sender (including our own retained
    /// clone) is dropped. Runs until the process shuts down.
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            metrics::EVENTS_DISPATCHED_TOTAL.with_label_values(&[event.kind()]).inc();
            for outgoing in self.dispatch(event) {
                let _ = self.sender.send(outgoing);
            }
        }
    }

    fn dispatch(&self, event: Event) -> Vec<Event> {
        match event {
            Event::Container(id, e) => self.dispatch_container(id, e),
            Event::TaskAttempt(id, e) => self.dispatch_attempt(id, e),
            Event::Task(id, e) => self.dispatch_task(id, e),
            Event::Vertex(id, e) => self.dispatch_vertex(id, e),
            Event::Dag(id, e) => self.dispatch_dag(id, e),
            // No entity owns these; hand off to the RM/NM communicator
            // tasks over their dedicated channels.
            Event::Rm(e) => {
                let _ = self.rm_tx.send(e);
                vec![]
            }
            Event::Nm(e) => {
                let _ = self.nm_tx.send(e);
                vec![]
            }
        }
    }

    fn dispatch_container(&self, id: ContainerId, event: ContainerEvent) -> Vec<Event> {
        let mut container = self.registry.containers.entry(id).or_insert_with(|| {
            warn!(container = %id, "event for unregistered container; the RM communicator should have registered it on grant");
            Container::new(id, NodeId { host: String::new(), port: 0 }, ResourceSpec { memory_mb: 0, vcores: 0 })
        });
        let events = container_sm::handle(&mut container, event, &self.profile);
        metrics::TRANSITIONS_TOTAL
            .with_label_values(&["container", &format!("{:?}", container.state)])
            .inc();
        events
    }

    fn dispatch_attempt(&self, id: TaskAttemptId, event: TaskAttemptEvent) -> Vec<Event> {
        let is_rescheduled = id.attempt > 0;
        let mut attempt = self
            .registry
            .attempts
            .entry(id)
            .or_insert_with(|| TaskAttempt::new(id, is_rescheduled));
        let resource = self
            .registry
            .vertices
            .get(&id.task.vertex)
            .map(|v| v.resource)
            .unwrap_or(ResourceSpec { memory_mb: 0, vcores: 0 });
        let dag = id.task.vertex.dag;
        let events = attempt_sm::handle(&mut attempt, event, resource, || attempt_sm::AssignContext {
            dag,
            resources: vec![],
            credentials: None,
        });
        metrics::TRANSITIONS_TOTAL
            .with_label_values(&["attempt", &format!("{:?}", attempt.state)])
            .inc();
        events
    }

    fn dispatch_task(&self, id: TaskId, event: TaskEvent) -> Vec<Event> {
        let Some(mut task) = self.registry.tasks.get_mut(&id) else {
            warn!(task = %id, "event for a task that was never submitted");
            return vec![];
        };
        let distance = self.registry.vertices.get(&id.vertex).map(|v| v.distance_from_root).unwrap_or(0);
        let events = task_sm::handle(&mut task, event, base_priority(distance));
        metrics::TRANSITIONS_TOTAL.with_label_values(&["task", &format!("{:?}", task.state)]).inc();
        drop(task);
        self.resolve_commit_replies(&events);
        events
    }

    /// `canCommit` RPC callers park a oneshot reply in
    /// `pending_commit_replies` rather than block the dispatch thread; the
    /// moment the task's commit decision actually lands on the bus
    /// (`CommitGranted`/`CommitDenied`), wake whichever caller is waiting
    /// on it. The grant itself was decided single-threaded, in
    /// `task_sm::handle`, above.
    fn resolve_commit_replies(&self, events: &[Event]) {
        for event in events {
            let (attempt, granted) = match event {
                Event::TaskAttempt(attempt, TaskAttemptEvent::CommitGranted) => (*attempt, true),
                Event::TaskAttempt(attempt, TaskAttemptEvent::CommitDenied) => (*attempt, false),
                _ => continue,
            };
            if let Some((_, reply)) = self.registry.pending_commit_replies.remove(&attempt) {
                let _ = reply.send(granted);
            }
        }
    }

    fn dispatch_vertex(&self, id: VertexId, event: VertexEvent) -> Vec<Event> {
        if let VertexEvent::RouteEvent { from_attempt, event } = &event {
            self.route_event(id, *from_attempt, event.clone());
            return vec![];
        }

        // Snapshot every vertex's (completed, total) counts before taking
        // this vertex's write guard. A vertex manager may query counts for
        // an arbitrary upstream vertex while `vertex_sm::handle` runs; if
        // that vertex shares a DashMap shard with `id`, a `get` against it
        // while `id`'s `get_mut` guard is still held deadlocks.
        let counts: HashMap<VertexId, (u32, u32)> = self
            .registry
            .vertices
            .iter()
            .map(|v| (*v.key(), (v.completed, v.tasks.len() as u32)))
            .collect();
        let upstream_counts = move |v: VertexId| counts.get(&v).copied().unwrap_or((0, 0));

        let Some(mut vertex) = self.registry.vertices.get_mut(&id) else {
            warn!(vertex = %id, "event for a vertex that was never submitted");
            return vec![];
        };
        let mut manager = self.registry.vertex_managers.entry(id).or_insert_with(|| {
            vertex_manager_by_name(&vertex.vertex_manager.name, &vertex.vertex_manager.user_payload)
                .unwrap_or_else(|| Box::new(ImmediateStartVertexManager))
        });

        let fanout_task = match &event {
            VertexEvent::TaskSucceeded { task } => Some(*task),
            _ => None,
        };

        let mut events = vertex_sm::handle(&mut vertex, event, manager.value_mut().as_mut(), &upstream_counts);
        metrics::TRANSITIONS_TOTAL.with_label_values(&["vertex", &format!("{:?}", vertex.state)]).inc();
        drop(vertex);
        drop(manager);

        if let Some(task) = fanout_task {
            events.extend(self.fanout_downstream(id, task));
        }
        events
    }

    /// Translate a completed source task into `SourceTaskCompleted`
    /// notifications for every vertex downstream of it, per the ordering
    /// rule that routing is fanned out before downstream plugins observe
    /// the completion. A downstream vertex still in `New` is started here
    /// too — only `dag.roots` get `Start` from `DagEvent::Start`, so this
    /// is what brings a non-root vertex's tasks into scheduling the first
    /// time one of its upstreams reports a completed task.
    fn fanout_downstream(&self, vertex: VertexId, task: TaskId) -> Vec<Event> {
        let Some(dag) = self.registry.dags.get(&vertex.dag) else {
            return vec![];
        };
        dag.downstream_of(vertex)
            .into_iter()
            .flat_map(|edge| {
                let mut events = Vec::new();
                let not_yet_started = self
                    .registry
                    .vertices
                    .get(&edge.to)
                    .map(|v| v.state == VertexState::New)
                    .unwrap_or(false);
                if not_yet_started {
                    events.push(Event::Vertex(edge.to, VertexEvent::Start));
                }
                events.push(Event::Vertex(
                    edge.to,
                    VertexEvent::SourceTaskCompleted { source_vertex: vertex, task_index: task.index },
                ));
                events
            })
            .collect()
    }

    /// Route one inbound heartbeat event, addressed to `owning_vertex`
    /// (the vertex of the attempt that reported it).
    ///
    /// `DataMovementEvent`/`InputFailedEvent`/`CompositeDataMovementEvent`
    /// describe `owning_vertex`'s own output and fan out to consumer task
    /// queues over every downstream edge, via that edge's `EdgeManager`.
    /// `InputReadErrorEvent` describes a read failure against an upstream
    /// partition and routes the other way, back to the producing task, via
    /// the upstream edge's `EdgeManager`. `VertexManagerEvent` and
    /// `TaskStatusUpdateEvent` are delivered to the vertex manager / logged
    /// respectively rather than queued for a consumer task.
    fn route_event(&self, owning_vertex: VertexId, from_attempt: TaskAttemptId, event: TezEvent) {
        let Some(dag) = self.registry.dags.get(&owning_vertex.dag) else {
            warn!(vertex = %owning_vertex, "route event for a vertex whose dag is unknown");
            return;
        };
        let src_idx = from_attempt.task.index;

        match &event {
            TezEvent::InputReadError(_) => {
                for edge in dag.upstream_edges_of(owning_vertex) {
                    let mgr = edge_manager_by_name(&edge.manager.name)
                        .unwrap_or_else(|| Box::new(am_core::edge::OneToOne));
                    let src_task_index = mgr.route_input_error_event_to_source(&event, src_idx);
                    let source_task = TaskId::new(edge.from, src_task_index);
                    warn!(task = %source_task, "input read error reported against this task's output");
                    self.registry.push_task_event(source_task, event.clone());
                }
            }
            TezEvent::VertexManager(vm_event) => {
                if let Some(target) = self
                    .registry
                    .vertices
                    .iter()
                    .find(|v| v.key().dag == owning_vertex.dag && v.name == vm_event.vertex_name)
                    .map(|v| *v.key())
                {
                    self.bus_handle_vertex_manager_event(target, vm_event.payload.clone());
                }
            }
            TezEvent::TaskStatusUpdate(update) => {
                tracing::debug!(task = %from_attempt.task, progress = update.progress, "task status update");
            }
            _ => {
                let expanded = match &event {
                    TezEvent::CompositeDataMovement(c) => {
                        c.expand().into_iter().map(TezEvent::DataMovement).collect()
                    }
                    other => vec![other.clone()],
                };
                for edge in dag.downstream_of(owning_vertex) {
                    let mgr = edge_manager_by_name(&edge.manager.name)
                        .unwrap_or_else(|| Box::new(am_core::edge::OneToOne));
                    let num_dest_tasks = self.registry.vertices.get(&edge.to).map(|v| v.tasks.len() as u32).unwrap_or(0);
                    for e in &expanded {
                        let route_map = match e {
                            TezEvent::InputFailed(_) => {
                                mgr.route_input_source_task_failed_event(src_idx, num_dest_tasks)
                            }
                            _ => mgr.route_data_movement_event(e, src_idx, num_dest_tasks),
                        };
                        for dest_indices in route_map.values() {
                            for &dest_idx in dest_indices {
                                let dest_task = TaskId::new(edge.to, dest_idx);
                                self.registry.push_task_event(dest_task, e.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    /// `Event::Vertex(_, VertexEvent::ManagerEvent)` re-entry, routed here
    /// instead of through the bus since we already hold the vertex's
    /// `VertexManagerEvent` payload and its target in hand.
    fn bus_handle_vertex_manager_event(&self, target: VertexId, payload: Vec<u8>) {
        self.sender_or_warn(Event::Vertex(target, VertexEvent::ManagerEvent { payload }));
    }

    fn sender_or_warn(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("dispatcher is no longer running; dropping event");
        }
    }

    fn dispatch_dag(&self, id: DagId, event: DagEvent) -> Vec<Event> {
        let Some(mut dag) = self.registry.dags.get_mut(&id) else {
            warn!(dag = %id, "event for a dag that was never submitted");
            return vec![];
        };
        let events = dag_sm::handle(&mut dag, event);
        metrics::TRANSITIONS_TOTAL.with_label_values(&["dag", &format!("{:?}", dag.state)]).inc();
        events
    }
}
