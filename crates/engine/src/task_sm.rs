//! Task state machine: aggregates attempt outcomes against `max_attempts`
//! and arbitrates output commit.

use am_common::ids::TaskAttemptId;
use am_core::{Event, Task, TaskAttemptEvent, TaskEvent, TaskState, VertexEvent};

/// `base_priority` is `2*(distance_from_root+1)`, fixed for the task's
/// lifetime; rescheduled attempts use `base_priority - 1`.
pub fn handle(task: &mut Task, event: TaskEvent, base_priority: i32) -> Vec<Event> {
    match event {
        TaskEvent::ScheduleFirstAttempt => {
            task.state = TaskState::Scheduled;
            let attempt = TaskAttemptId::new(task.id, 0);
            task.attempts.push(attempt);
            vec![Event::TaskAttempt(attempt, TaskAttemptEvent::Schedule { priority: base_priority })]
        }

        TaskEvent::CanCommit { attempt } => {
            if task.committed {
                vec![Event::TaskAttempt(attempt, TaskAttemptEvent::CommitDenied)]
            } else {
                task.committed = true;
                task.successful_attempt = Some(attempt);
                vec![Event::TaskAttempt(attempt, TaskAttemptEvent::CommitGranted)]
            }
        }

        TaskEvent::AttemptSucceeded { attempt } => {
            if task.is_committing_output && task.successful_attempt != Some(attempt) {
                return vec![];
            }
            task.state = TaskState::Succeeded;
            task.successful_attempt = Some(attempt);
            vec![Event::Vertex(task.id.vertex, VertexEvent::TaskSucceeded { task: task.id })]
        }

        TaskEvent::AttemptFailed { attempt: _, retryable, chargeable } => {
            if chargeable {
                task.charged_failures += 1;
            }
            if retryable && !task.attempts_exhausted() {
                let next = TaskAttemptId::new(task.id, task.attempts.len() as u32);
                task.attempts.push(next);
                vec![Event::TaskAttempt(
                    next,
                    TaskAttemptEvent::Schedule { priority: base_priority - 1 },
                )]
            } else {
                task.state = TaskState::Failed;
                vec![Event::Vertex(task.id.vertex, VertexEvent::TaskFailed { task: task.id })]
            }
        }

        TaskEvent::AttemptKilled { attempt: _ } => {
            task.state = TaskState::Killed;
            vec![Event::Vertex(task.id.vertex, VertexEvent::TaskKilled { task: task.id })]
        }
    }
}
