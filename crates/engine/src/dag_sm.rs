//! DAG state machine: aggregates vertex outcomes into the overall DAG
//! terminal state.

use am_core::{Dag, DagEvent, DagState, Event, VertexEvent};

/// Drive one event through the DAG's state machine. `Start` only emits
/// `Vertex::Start` to `dag.roots` — every other vertex is started later,
/// by `bus::fanout_downstream`, the first time one of its upstreams
/// reports a completed task.
pub fn handle(dag: &mut Dag, event: DagEvent) -> Vec<Event> {
    match event {
        DagEvent::Start => {
            dag.state = DagState::Running;
            dag.roots
                .iter()
                .map(|v| Event::Vertex(*v, VertexEvent::Start))
                .collect()
        }

        DagEvent::VertexSucceeded { vertex: _ } => {
            dag.succeeded += 1;
            if dag.succeeded == dag.vertices.len() as u32 {
                dag.state = DagState::Succeeded;
            }
            vec![]
        }

        DagEvent::VertexFailed { vertex: _ } => {
            dag.failed += 1;
            dag.state = DagState::Failed;
            vec![]
        }

        DagEvent::VertexKilled { vertex: _ } => {
            dag.killed += 1;
            if dag.state != DagState::Failed {
                dag.state = DagState::Killed;
            }
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, DagId, VertexId};

    fn dag_with(n: u32) -> Dag {
        let id = DagId { app: ApplicationId(1), dag: 0 };
        let vertices: Vec<VertexId> = (0..n).map(|i| VertexId { dag: id, vertex: i }).collect();
        Dag {
            id,
            name: "d".into(),
            state: DagState::New,
            vertices: vertices.clone(),
            edges: vec![],
            roots: vertices,
            succeeded: 0,
            failed: 0,
            killed: 0,
        }
    }

    #[test]
    fn start_emits_vertex_start_to_every_root() {
        let mut d = dag_with(2);
        let events = handle(&mut d, DagEvent::Start);
        assert_eq!(events.len(), 2);
        assert_eq!(d.state, DagState::Running);
    }

    #[test]
    fn dag_succeeds_once_every_vertex_has() {
        let mut d = dag_with(2);
        handle(&mut d, DagEvent::Start);
        handle(&mut d, DagEvent::VertexSucceeded { vertex: d.vertices[0] });
        assert_eq!(d.state, DagState::Running);
        handle(&mut d, DagEvent::VertexSucceeded { vertex: d.vertices[1] });
        assert_eq!(d.state, DagState::Succeeded);
    }

    #[test]
    fn a_single_vertex_failure_fails_the_dag() {
        let mut d = dag_with(2);
        handle(&mut d, DagEvent::Start);
        handle(&mut d, DagEvent::VertexFailed { vertex: d.vertices[0] });
        assert_eq!(d.state, DagState::Failed);
    }
}
