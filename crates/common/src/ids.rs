//! Hierarchical identifiers for the DAG entity tree.
//!
//! Each id carries its parent as a field, so a `TaskAttemptId` is a
//! complete path from the application down to the attempt. Ids are value
//! types: `Copy`, totally ordered, hashable, and serializable, so they can
//! be used as map keys in the bus-owned registries without ever reaching
//! for a shared pointer.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app_{:06}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DagId {
    pub app: ApplicationId,
    pub dag: u32,
}

impl fmt::Display for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.dag_{}", self.app, self.dag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId {
    pub dag: DagId,
    pub vertex: u32,
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.vertex_{}", self.dag, self.vertex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub vertex: VertexId,
    pub index: u32,
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.task_{}", self.vertex, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskAttemptId {
    pub task: TaskId,
    pub attempt: u32,
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.attempt_{}", self.task, self.attempt)
    }
}

/// A resource lease id minted by the resource manager. Independent of the
/// hierarchy above: a container outlives no particular task and may run a
/// sequence of attempts from different tasks over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container_{:08}", self.0)
    }
}

/// Node (host) identity as reported by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub host: String,
    pub port: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TaskId {
    pub fn new(vertex: VertexId, index: u32) -> Self {
        Self { vertex, index }
    }
}

impl TaskAttemptId {
    pub fn new(task: TaskId, attempt: u32) -> Self {
        Self { task, attempt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_hierarchical() {
        let app = ApplicationId(1);
        let dag = DagId { app, dag: 0 };
        let vertex = VertexId { dag, vertex: 2 };
        let task = TaskId::new(vertex, 5);
        let attempt = TaskAttemptId::new(task, 1);
        assert_eq!(
            attempt.to_string(),
            "app_000001.dag_0.vertex_2.task_5.attempt_1"
        );
    }

    #[test]
    fn ids_are_totally_ordered() {
        let dag = DagId { app: ApplicationId(1), dag: 0 };
        let v = VertexId { dag, vertex: 0 };
        let t0 = TaskId::new(v, 0);
        let t1 = TaskId::new(v, 1);
        assert!(t0 < t1);
    }
}
