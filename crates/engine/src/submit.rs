//! DAG submission: the one place outside the dispatcher that is allowed to
//! populate the registry directly, since `Task`/`Vertex`/`Dag` entities must
//! already exist before the bus will route events to them.

use am_common::ids::DagId;
use am_core::{build, DagBuildError, DagEvent, DagSpec, Event, Task};
use std::sync::Arc;

use crate::registry::Registry;
use crate::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Build(#[from] DagBuildError),
}

/// Validate and materialize `spec` into the registry, then enqueue
/// `DagEvent::Start` so the dispatcher fans it out to the root vertices.
///
/// Returns the assigned `DagId` on success.
pub fn submit_dag(
    registry: &Arc<Registry>,
    bus: &EventBus,
    id: DagId,
    spec: &DagSpec,
    max_attempts: u32,
) -> Result<DagId, SubmitError> {
    let (dag, vertices) = build(id, spec)?;

    for vertex in &vertices {
        for &task_id in &vertex.tasks {
            registry.tasks.insert(task_id, Task::new(task_id, max_attempts, vertex.output_commits));
        }
        registry.vertices.insert(vertex.id, vertex.clone());
    }
    registry.dags.insert(id, dag);

    bus.handle(Event::Dag(id, DagEvent::Start));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, VertexId};
    use am_core::{DagEdge, EdgeManagerDescriptor, ResourceSpec, VertexManagerDescriptor, VertexSpec};

    fn vid(dag: DagId, n: u32) -> VertexId {
        VertexId { dag, vertex: n }
    }

    #[tokio::test]
    async fn submission_populates_tasks_and_starts_the_dag() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher, _channels) = crate::new_bus(registry.clone(), am_common::config::AmConfig::default());

        let dag_id = DagId { app: ApplicationId(1), dag: 0 };
        let spec = DagSpec {
            name: "t".into(),
            vertices: vec![VertexSpec {
                id: vid(dag_id, 0),
                name: "v0".into(),
                resource: ResourceSpec { memory_mb: 1024, vcores: 1 },
                parallelism: Some(2),
                vertex_manager: VertexManagerDescriptor { name: "ImmediateStart".into(), user_payload: vec![] },
                failure_tolerance: 0.0,
                output_commits: false,
            }],
            edges: Vec::<DagEdge>::new(),
        };

        submit_dag(&registry, &bus, dag_id, &spec, 4).unwrap();

        assert_eq!(registry.dags.len(), 1);
        assert_eq!(registry.vertices.len(), 1);
        assert_eq!(registry.tasks.len(), 2);

        // Run the dispatcher briefly: `DagEvent::Start` fans out to the
        // single root vertex, which an `ImmediateStart` manager schedules
        // every task of, bringing the dag to `Running` with both tasks
        // moved out of `New`.
        let handle = tokio::spawn(dispatcher.run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        let dag = registry.dags.get(&dag_id).unwrap();
        assert_eq!(dag.state, am_core::DagState::Running);
    }
}
