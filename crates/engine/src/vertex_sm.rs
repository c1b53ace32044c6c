//! Vertex state machine: aggregates task outcomes and defers task release
//! and parallelism decisions to the vertex's `VertexManager` plugin.
//!
//! Downstream edge fan-out (turning a completed task into data-movement
//! events for consumer vertices) is cross-entity and lives in
//! [`crate::bus`], which has the DAG's edge list; this module only tracks
//! one vertex's own aggregate state and drives its plugin.

use am_common::ids::{TaskId, VertexId};
use am_core::{DagEvent, Event, TaskEvent, Vertex, VertexEvent, VertexManager, VertexManagerContext, VertexState};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

struct RecordingContext<'a> {
    num_tasks: u32,
    upstream_counts: &'a dyn Fn(VertexId) -> (u32, u32),
    scheduled: RefCell<Vec<u32>>,
    parallelism: Cell<Option<u32>>,
}

impl VertexManagerContext for RecordingContext<'_> {
    fn num_tasks(&self) -> u32 {
        self.num_tasks
    }

    fn schedule_vertex_tasks(&self, indices: &[u32]) {
        self.scheduled.borrow_mut().extend_from_slice(indices);
    }

    fn set_vertex_parallelism(&self, parallelism: u32) {
        self.parallelism.set(Some(parallelism));
    }

    fn completed_tasks_on(&self, vertex: VertexId) -> u32 {
        (self.upstream_counts)(vertex).0
    }

    fn total_tasks_on(&self, vertex: VertexId) -> u32 {
        (self.upstream_counts)(vertex).1
    }
}

fn apply(vertex: &mut Vertex, ctx: RecordingContext) -> Vec<Event> {
    if !vertex.is_parallelism_final() {
        if let Some(p) = ctx.parallelism.get() {
            vertex.parallelism = Some(p);
        }
    }
    ctx.scheduled
        .into_inner()
        .into_iter()
        .map(|idx| Event::Task(TaskId::new(vertex.id, idx), TaskEvent::ScheduleFirstAttempt))
        .collect()
}

pub fn handle(
    vertex: &mut Vertex,
    event: VertexEvent,
    manager: &mut dyn VertexManager,
    upstream_counts: &dyn Fn(VertexId) -> (u32, u32),
) -> Vec<Event> {
    match event {
        VertexEvent::Start => {
            vertex.state = VertexState::Running;
            let ctx = RecordingContext {
                num_tasks: vertex.tasks.len() as u32,
                upstream_counts,
                scheduled: RefCell::new(Vec::new()),
                parallelism: Cell::new(None),
            };
            manager.initialize(&ctx);
            manager.on_vertex_started(&ctx, &HashMap::new());
            apply(vertex, ctx)
        }

        VertexEvent::SourceTaskCompleted { source_vertex, task_index } => {
            let ctx = RecordingContext {
                num_tasks: vertex.tasks.len() as u32,
                upstream_counts,
                scheduled: RefCell::new(Vec::new()),
                parallelism: Cell::new(None),
            };
            manager.on_source_task_completed(&ctx, source_vertex, task_index);
            apply(vertex, ctx)
        }

        VertexEvent::ManagerEvent { payload } => {
            let ctx = RecordingContext {
                num_tasks: vertex.tasks.len() as u32,
                upstream_counts,
                scheduled: RefCell::new(Vec::new()),
                parallelism: Cell::new(None),
            };
            manager.on_vertex_manager_event_received(&ctx, &payload);
            apply(vertex, ctx)
        }

        VertexEvent::TaskSucceeded { task: _ } => {
            vertex.completed += 1;
            vertex.running = vertex.running.saturating_sub(1);
            maybe_finish(vertex)
        }

        VertexEvent::TaskFailed { task: _ } => {
            vertex.failed += 1;
            vertex.running = vertex.running.saturating_sub(1);
            if vertex.failure_budget_exceeded() {
                vertex.state = VertexState::Failed;
                vec![Event::Dag(vertex.id.dag, DagEvent::VertexFailed { vertex: vertex.id })]
            } else {
                vec![]
            }
        }

        VertexEvent::TaskKilled { task: _ } => {
            vertex.killed += 1;
            vertex.running = vertex.running.saturating_sub(1);
            vec![]
        }

        VertexEvent::ScheduleTasks { indices } => indices
            .into_iter()
            .map(|idx| Event::Task(TaskId::new(vertex.id, idx), TaskEvent::ScheduleFirstAttempt))
            .collect(),

        VertexEvent::RouteEvent { .. } => vec![],
    }
}

fn maybe_finish(vertex: &mut Vertex) -> Vec<Event> {
    if vertex.is_parallelism_final() && vertex.completed == vertex.tasks.len() as u32 {
        vertex.state = VertexState::Succeeded;
        vec![Event::Dag(vertex.id.dag, DagEvent::VertexSucceeded { vertex: vertex.id })]
    } else {
        vec![]
    }
}
