//! The DAG domain model: vertices, tasks, task attempts, and containers.
//!
//! These are plain records — no entity ever owns another by value, only by
//! id. Cross-references (e.g. an attempt's assigned container) are looked
//! up through the registries the event bus owns; see `am-engine::registry`.

use am_common::ids::{ContainerId, DagId, NodeId, TaskAttemptId, TaskId, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A resource ask: cpu/memory shape requested for a container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub memory_mb: u32,
    pub vcores: u32,
}

/// A single localized resource a container has pulled down (e.g. a jar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey(pub String);

/// Opaque security tokens shipped to a container when its DAG changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub dag: DagId,
    pub tokens: HashMap<String, Vec<u8>>,
}

// ---------------------------------------------------------------- Container

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Allocated,
    Launching,
    Idle,
    Running,
    StopRequested,
    Stopping,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub node: NodeId,
    pub resource: ResourceSpec,
    pub state: ContainerState,
    /// Union of every resource ever localized on this container.
    pub localized: HashSet<ResourceKey>,
    /// DAG the last-dispatched attempt belonged to; drives the
    /// credentials delta.
    pub last_dag: Option<DagId>,
    pub credentials: Option<Credentials>,
    /// Every attempt this container has ever run, in order.
    pub attempts_run: Vec<TaskAttemptId>,
    pub queued: Option<TaskAttemptId>,
    pub running: Option<TaskAttemptId>,
    pub is_in_error_state: bool,
    /// Attempts bumped out of their slot by an invariant-violating
    /// assignment, awaiting a terminal notification once the container
    /// actually stops.
    pub pending_termination: Vec<TaskAttemptId>,
    /// Resources newly localised by the most recent `AssignTa`, beyond
    /// what `localized` already held — what `getTask` ships, not the
    /// full accumulated set.
    pub pending_resource_delta: Vec<ResourceKey>,
    /// Whether the most recent `AssignTa`'s DAG differed from `last_dag`,
    /// i.e. whether `getTask` should ship `credentials` at all.
    pub credentials_changed: bool,
}

impl Container {
    pub fn new(id: ContainerId, node: NodeId, resource: ResourceSpec) -> Self {
        Self {
            id,
            node,
            resource,
            state: ContainerState::Allocated,
            localized: HashSet::new(),
            last_dag: None,
            credentials: None,
            attempts_run: Vec::new(),
            queued: None,
            running: None,
            is_in_error_state: false,
            pending_termination: Vec::new(),
            pending_resource_delta: Vec::new(),
            credentials_changed: false,
        }
    }

    /// Every attempt currently occupying a slot: at most one queued, at
    /// most one running, per the container invariant.
    pub fn occupied_attempts(&self) -> Vec<TaskAttemptId> {
        [self.queued, self.running].into_iter().flatten().collect()
    }
}

// ------------------------------------------------------------- TaskAttempt

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskAttemptState {
    New,
    StartWait,
    Submitted,
    Running,
    CommitPending,
    Succeeded,
    Failed,
    Killed,
}

impl TaskAttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub id: TaskAttemptId,
    pub state: TaskAttemptState,
    pub container: Option<ContainerId>,
    pub is_rescheduled: bool,
    pub diagnostics: Vec<String>,
}

impl TaskAttempt {
    pub fn new(id: TaskAttemptId, is_rescheduled: bool) -> Self {
        Self {
            id,
            state: TaskAttemptState::New,
            container: None,
            is_rescheduled,
            diagnostics: Vec::new(),
        }
    }
}

// -------------------------------------------------------------------- Task

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    New,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    pub max_attempts: u32,
    pub attempts: Vec<TaskAttemptId>,
    pub successful_attempt: Option<TaskAttemptId>,
    pub committed: bool,
    pub is_committing_output: bool,
    /// Failures charged against `max_attempts`. Preempted attempts are
    /// rescheduled without being charged, per the budget invariant.
    pub charged_failures: u32,
}

impl Task {
    pub fn new(id: TaskId, max_attempts: u32, is_committing_output: bool) -> Self {
        Self {
            id,
            state: TaskState::New,
            max_attempts,
            attempts: Vec::new(),
            successful_attempt: None,
            committed: false,
            is_committing_output,
            charged_failures: 0,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.charged_failures >= self.max_attempts
    }
}

// ------------------------------------------------------------------ Vertex

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexState {
    New,
    Initializing,
    Running,
    Succeeded,
    Failed,
    Killed,
}

/// Descriptor for an `EdgeManager` plugin, carried in the DAG submission
/// and instantiated by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeManagerDescriptor {
    pub name: String,
    pub user_payload: Vec<u8>,
}

/// Descriptor for a `VertexManager` plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexManagerDescriptor {
    pub name: String,
    pub user_payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub name: String,
    pub state: VertexState,
    pub resource: ResourceSpec,
    /// `None` until the vertex manager fixes it (deferred parallelism).
    pub parallelism: Option<u32>,
    pub distance_from_root: u32,
    pub vertex_manager: VertexManagerDescriptor,
    pub tasks: Vec<TaskId>,
    pub completed: u32,
    pub running: u32,
    pub killed: u32,
    pub failed: u32,
    pub failure_tolerance: f64,
    pub output_commits: bool,
}

impl Vertex {
    pub fn is_parallelism_final(&self) -> bool {
        self.parallelism.is_some()
    }

    pub fn failure_budget_exceeded(&self) -> bool {
        if self.tasks.is_empty() {
            return false;
        }
        let total = self.tasks.len() as f64;
        (f64::from(self.failed) / total) > self.failure_tolerance
    }
}

// --------------------------------------------------------------------- Dag

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DagState {
    New,
    Running,
    Succeeded,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: VertexId,
    pub to: VertexId,
    pub manager: EdgeManagerDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    pub id: DagId,
    pub name: String,
    pub state: DagState,
    pub vertices: Vec<VertexId>,
    pub edges: Vec<DagEdge>,
    /// Vertices with no incoming edge, assigned at DAG initialisation.
    pub roots: Vec<VertexId>,
    pub succeeded: u32,
    pub failed: u32,
    pub killed: u32,
}

impl Dag {
    /// Vertices that feed directly into `vertex`.
    pub fn upstream_of(&self, vertex: VertexId) -> Vec<VertexId> {
        self.edges.iter().filter(|e| e.to == vertex).map(|e| e.from).collect()
    }

    /// Vertices fed directly by `vertex`.
    pub fn downstream_of(&self, vertex: VertexId) -> Vec<&DagEdge> {
        self.edges.iter().filter(|e| e.from == vertex).collect()
    }

    /// Edges feeding directly into `vertex`, with their `EdgeManager`
    /// descriptor — used to route a consumer-reported read error back to
    /// its producer.
    pub fn upstream_edges_of(&self, vertex: VertexId) -> Vec<&DagEdge> {
        self.edges.iter().filter(|e| e.to == vertex).collect()
    }
}

/// A submission-time vertex descriptor, before the DAG is initialized
/// (distances assigned, task sets instantiated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexSpec {
    pub id: VertexId,
    pub name: String,
    pub resource: ResourceSpec,
    pub parallelism: Option<u32>,
    pub vertex_manager: VertexManagerDescriptor,
    pub failure_tolerance: f64,
    pub output_commits: bool,
}

/// A submission-time DAG: vertices plus edges, not yet validated or
/// distance-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagSpec {
    pub name: String,
    pub vertices: Vec<VertexSpec>,
    pub edges: Vec<DagEdge>,
}

#[derive(Debug, thiserror::Error)]
pub enum DagBuildError {
    #[error("DAG contains a cycle")]
    Cyclic,
    #[error("edge references unknown vertex {0:?}")]
    UnknownVertex(VertexId),
    #[error("duplicate vertex id {0:?}")]
    DuplicateVertex(VertexId),
}

/// Validate a `DagSpec` is acyclic and assign `distance_from_root`
/// (longest source-free path length) to every vertex, per the invariant
/// that priority strictly decreases with distance from the root.
///
/// Returns the per-vertex distance map in submission order.
pub fn assign_distances(
    spec: &DagSpec,
) -> Result<HashMap<VertexId, u32>, DagBuildError> {
    use petgraph::algo::is_cyclic_directed;
    use petgraph::graph::{DiGraph, NodeIndex};
    use petgraph::visit::{EdgeRef, Topo};
    use petgraph::Direction;

    let mut graph: DiGraph<VertexId, ()> = DiGraph::new();
    let mut index_of: HashMap<VertexId, NodeIndex> = HashMap::new();

    for v in &spec.vertices {
        if index_of.insert(v.id, graph.add_node(v.id)).is_some() {
            return Err(DagBuildError::DuplicateVertex(v.id));
        }
    }

    for edge in &spec.edges {
        let from = *index_of
            .get(&edge.from)
            .ok_or(DagBuildError::UnknownVertex(edge.from))?;
        let to = *index_of
            .get(&edge.to)
            .ok_or(DagBuildError::UnknownVertex(edge.to))?;
        graph.add_edge(from, to, ());
    }

    if is_cyclic_directed(&graph) {
        return Err(DagBuildError::Cyclic);
    }

    let mut distance: HashMap<NodeIndex, u32> = HashMap::new();
    let mut topo = Topo::new(&graph);
    while let Some(node) = topo.next(&graph) {
        let d = graph
            .edges_directed(node, Direction::Incoming)
            .map(|e| distance.get(&e.source()).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        distance.insert(node, d);
    }

    Ok(distance
        .into_iter()
        .map(|(idx, d)| (graph[idx], d))
        .collect())
}

/// Validate and materialise a submitted `DagSpec` into a `Dag` plus its
/// `Vertex` records, with `distance_from_root` assigned to each.
pub fn build(id: DagId, spec: &DagSpec) -> Result<(Dag, Vec<Vertex>), DagBuildError> {
    let distances = assign_distances(spec)?;
    let roots: Vec<VertexId> = spec
        .vertices
        .iter()
        .map(|v| v.id)
        .filter(|id| !spec.edges.iter().any(|e| e.to == *id))
        .collect();

    let vertices: Vec<Vertex> = spec
        .vertices
        .iter()
        .map(|v| Vertex {
            id: v.id,
            name: v.name.clone(),
            state: VertexState::New,
            resource: v.resource,
            parallelism: v.parallelism,
            distance_from_root: distances[&v.id],
            vertex_manager: v.vertex_manager.clone(),
            tasks: v
                .parallelism
                .map(|n| (0..n).map(|i| TaskId::new(v.id, i)).collect())
                .unwrap_or_default(),
            completed: 0,
            running: 0,
            killed: 0,
            failed: 0,
            failure_tolerance: v.failure_tolerance,
            output_commits: v.output_commits,
        })
        .collect();

    let dag = Dag {
        id,
        name: spec.name.clone(),
        state: DagState::New,
        vertices: spec.vertices.iter().map(|v| v.id).collect(),
        edges: spec.edges.clone(),
        roots,
        succeeded: 0,
        failed: 0,
        killed: 0,
    };

    Ok((dag, vertices))
}
