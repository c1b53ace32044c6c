//! Task-attempt state machine.
//!
//! `NEW -> START_WAIT -> SUBMITTED -> RUNNING -> (SUCCEEDED | FAILED | KILLED)`,
//! plus the transient `COMMIT_PENDING` state while output-commit arbitration
//! is in flight.

use am_common::ids::{ContainerId, DagId};
use am_core::{
    Credentials, Event, ResourceKey, ResourceSpec, RmEvent, TaskAttempt, TaskAttemptEvent,
    TaskAttemptState, TaskEvent,
};

/// Context needed to translate a container grant into an `AssignTa`, beyond
/// what the attempt record itself carries.
pub struct AssignContext {
    pub dag: DagId,
    pub resources: Vec<ResourceKey>,
    pub credentials: Option<Credentials>,
}

pub fn handle(
    attempt: &mut TaskAttempt,
    event: TaskAttemptEvent,
    resource: ResourceSpec,
    assign_ctx: impl FnOnce() -> AssignContext,
) -> Vec<Event> {
    use TaskAttemptState::{CommitPending, New, Running, StartWait, Submitted, Succeeded};

    if attempt.state.is_terminal() {
        return vec![];
    }

    match (attempt.state, event) {
        (New, TaskAttemptEvent::Schedule { priority }) => {
            attempt.state = StartWait;
            vec![Event::Rm(RmEvent::ContainerAsk { attempt: attempt.id, priority, resource })]
        }

        (StartWait, TaskAttemptEvent::ContainerAssigned { container }) => {
            attempt.state = Submitted;
            attempt.container = Some(container);
            let ctx = assign_ctx();
            vec![Event::Container(
                container,
                am_core::ContainerEvent::AssignTa {
                    attempt: attempt.id,
                    dag: ctx.dag,
                    resources: ctx.resources,
                    credentials: ctx.credentials,
                },
            )]
        }

        (Submitted, TaskAttemptEvent::StartedRemotely) => {
            attempt.state = Running;
            vec![]
        }

        (StartWait | Submitted, TaskAttemptEvent::ContainerTerminated) => {
            fail(attempt, "container terminated before running".into(), true, true)
        }

        (Running, TaskAttemptEvent::ContainerTerminated) => {
            fail(attempt, "container terminated while running".into(), true, true)
        }

        (_, TaskAttemptEvent::ContainerPreempted) => {
            fail(attempt, "container preempted".into(), true, false)
        }

        (_, TaskAttemptEvent::NodeFailed) => fail(attempt, "node failed".into(), true, true),

        (Running, TaskAttemptEvent::Failed { diagnostics }) => {
            fail(attempt, diagnostics, true, true)
        }

        (Running, TaskAttemptEvent::CommitPending) => {
            attempt.state = CommitPending;
            vec![]
        }

        (CommitPending, TaskAttemptEvent::CommitGranted) => {
            attempt.state = Succeeded;
            vec![Event::Task(attempt.id.task, TaskEvent::AttemptSucceeded { attempt: attempt.id })]
        }

        (CommitPending, TaskAttemptEvent::CommitDenied) => {
            fail(attempt, "commit denied".into(), false, true)
        }

        (Running, TaskAttemptEvent::Succeeded) => {
            attempt.state = Succeeded;
            vec![Event::Task(attempt.id.task, TaskEvent::AttemptSucceeded { attempt: attempt.id })]
        }

        (_, TaskAttemptEvent::Killed) => {
            attempt.state = TaskAttemptState::Killed;
            vec![Event::Task(attempt.id.task, TaskEvent::AttemptKilled { attempt: attempt.id })]
        }

        _ => vec![],
    }
}

fn fail(attempt: &mut TaskAttempt, diagnostics: String, retryable: bool, chargeable: bool) -> Vec<Event> {
    attempt.state = TaskAttemptState::Failed;
    attempt.diagnostics.push(diagnostics);
    vec![Event::Task(
        attempt.id.task,
        TaskEvent::AttemptFailed { attempt: attempt.id, retryable, chargeable },
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, TaskAttemptId, TaskId, VertexId};

    fn attempt_id() -> TaskAttemptId {
        let app = ApplicationId(1);
        let dag = DagId { app, dag: 0 };
        let vertex = VertexId { dag, vertex: 0 };
        let task = TaskId::new(vertex, 0);
        TaskAttemptId::new(task, 0)
    }

    fn resource() -> ResourceSpec {
        ResourceSpec { memory_mb: 1024, vcores: 1 }
    }

    fn ctx() -> AssignContext {
        AssignContext {
            dag: DagId { app: ApplicationId(1), dag: 0 },
            resources: vec![],
            credentials: None,
        }
    }

    #[test]
    fn schedule_then_grant_emits_assign_ta() {
        let mut a = TaskAttempt::new(attempt_id(), false);
        let events = handle(&mut a, TaskAttemptEvent::Schedule { priority: 2 }, resource(), ctx);
        assert!(matches!(events[0], Event::Rm(RmEvent::ContainerAsk { priority: 2, .. })));
        assert_eq!(a.state, TaskAttemptState::StartWait);

        let events = handle(
            &mut a,
            TaskAttemptEvent::ContainerAssigned { container: ContainerId(7) },
            resource(),
            ctx,
        );
        assert_eq!(a.state, TaskAttemptState::Submitted);
        assert!(matches!(events[0], Event::Container(_, am_core::ContainerEvent::AssignTa { .. })));
    }

    #[test]
    fn preemption_does_not_charge_budget() {
        let mut a = TaskAttempt::new(attempt_id(), false);
        a.state = TaskAttemptState::Running;
        let events = handle(&mut a, TaskAttemptEvent::ContainerPreempted, resource(), ctx);
        match &events[0] {
            Event::Task(_, TaskEvent::AttemptFailed { retryable, chargeable, .. }) => {
                assert!(*retryable);
                assert!(!*chargeable);
            }
            _ => panic!("expected AttemptFailed"),
        }
    }

    #[test]
    fn commit_denied_fails_the_attempt() {
        let mut a = TaskAttempt::new(attempt_id(), false);
        a.state = TaskAttemptState::CommitPending;
        let events = handle(&mut a, TaskAttemptEvent::CommitDenied, resource(), ctx);
        assert_eq!(a.state, TaskAttemptState::Failed);
        assert!(matches!(events[0], Event::Task(_, TaskEvent::AttemptFailed { retryable: false, .. })));
    }
}
