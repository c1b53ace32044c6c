//! Container state machine: `(state, event) -> (new state, outgoing events)`.
//!
//! A pure function over the entity record plus the event. The dispatcher in
//! [`crate::bus`] owns delivery and emission; this module only computes the
//! transition.

use am_common::config::AmConfig;
use am_core::{
    Container, ContainerEvent, ContainerState, Credentials, Event, NmEvent, ResourceKey, RmEvent,
    TaskAttemptEvent,
};
use std::collections::HashSet;

fn launch_command(container_id: u64, profile: &AmConfig) -> String {
    if profile.profile_containers.contains(&container_id) {
        profile.profile_jvm_opts.clone()
    } else {
        String::new()
    }
}

/// Resources newly localised by this assignment, beyond what the container
/// already has accumulated.
fn resource_delta(container: &Container, requested: &[ResourceKey]) -> Vec<ResourceKey> {
    requested
        .iter()
        .filter(|r| !container.localized.contains(*r))
        .cloned()
        .collect()
}

/// Whether credentials changed since the last dispatched DAG on this
/// container, per the credentials-delta rule.
fn credentials_changed(container: &Container, dag: am_common::ids::DagId) -> bool {
    container.last_dag != Some(dag)
}

fn terminate_occupants(container: &mut Container, preempted: bool) -> Vec<Event> {
    let event = |attempt| {
        let kind = if preempted {
            TaskAttemptEvent::ContainerPreempted
        } else {
            TaskAttemptEvent::ContainerTerminated
        };
        Event::TaskAttempt(attempt, kind)
    };
    let mut events: Vec<Event> = container.occupied_attempts().into_iter().map(event).collect();
    events.extend(container.pending_termination.drain(..).map(event));
    events
}

/// Move every currently-occupying attempt (queued and/or running) out of
/// its slot and into `pending_termination`, emitting the advisory
/// `ContainerTerminating` for each. The container has not actually stopped
/// yet at this point — only `Completed` hands out the terminal
/// `ContainerTerminated`/`ContainerPreempted` events, via `pending_termination`.
fn terminate_occupants_pending(container: &mut Container) -> Vec<Event> {
    let occupants = container.occupied_attempts();
    container.queued = None;
    container.running = None;
    let mut events = Vec::new();
    for attempt in occupants {
        container.pending_termination.push(attempt);
        events.push(Event::TaskAttempt(attempt, TaskAttemptEvent::ContainerTerminating));
    }
    events
}

/// Drive one event through the container's state machine.
pub fn handle(container: &mut Container, event: ContainerEvent, profile: &AmConfig) -> Vec<Event> {
    use ContainerState::{Allocated, Completed, Idle, Launching, Running, Stopping, StopRequested};

    match (container.state, event) {
        (Allocated, ContainerEvent::LaunchRequest { resource, credentials }) => {
            container.state = Launching;
            container.credentials = credentials;
            let cmd = launch_command(container.id.0, profile);
            vec![Event::Nm(NmEvent::LaunchRequest {
                container: container.id,
                resource,
                credentials: container.credentials.clone(),
                launch_command: cmd,
            })]
        }

        (Launching, ContainerEvent::AssignTa { attempt, dag, resources, credentials }) => {
            if container.queued.is_some() || container.running.is_some() {
                return double_assign_error(container, attempt);
            }
            assign(container, attempt, dag, &resources, credentials);
            vec![]
        }

        (Launching, ContainerEvent::Launched) => {
            container.state = Idle;
            vec![]
        }

        (Idle, ContainerEvent::AssignTa { attempt, dag, resources, credentials }) => {
            if container.queued.is_some() || container.running.is_some() {
                return double_assign_error(container, attempt);
            }
            assign(container, attempt, dag, &resources, credentials);
            vec![]
        }

        (Idle, ContainerEvent::PullTask) => {
            if let Some(attempt) = container.queued.take() {
                container.running = Some(attempt);
                container.attempts_run.push(attempt);
                container.state = Running;
            }
            vec![]
        }

        (Running, ContainerEvent::TaSucceeded) => {
            container.running = None;
            container.state = Idle;
            vec![]
        }

        (_, ContainerEvent::Completed { status, preempted }) => {
            let events = terminate_occupants(container, preempted);
            container.queued = None;
            container.running = None;
            container.state = Completed;
            container.localized = HashSet::new();
            let _ = status;
            events
        }

        (_, ContainerEvent::NodeFailed) => {
            container.state = Stopping;
            let mut events: Vec<Event> = container
                .attempts_run
                .iter()
                .map(|attempt| Event::TaskAttempt(*attempt, TaskAttemptEvent::NodeFailed))
                .collect();
            if let Some(running) = container.running {
                events.push(Event::TaskAttempt(running, TaskAttemptEvent::ContainerTerminating));
            }
            events.push(Event::Rm(RmEvent::ContainerDeallocate { container: container.id }));
            events
        }

        (Running | Idle, ContainerEvent::TimedOut) => {
            container.state = StopRequested;
            let mut events = terminate_occupants_pending(container);
            events.push(Event::Nm(NmEvent::StopRequest { container: container.id }));
            events
        }

        (StopRequested, ContainerEvent::NmStopFailed) => {
            container.state = Stopping;
            vec![Event::Rm(RmEvent::ContainerDeallocate { container: container.id })]
        }

        (StopRequested, ContainerEvent::NmStopSent) => vec![],

        _ => {
            container.is_in_error_state = true;
            vec![]
        }
    }
}

fn assign(
    container: &mut Container,
    attempt: am_common::ids::TaskAttemptId,
    dag: am_common::ids::DagId,
    resources: &[ResourceKey],
    credentials: Option<Credentials>,
) {
    container.queued = Some(attempt);
    let changed = credentials_changed(container, dag);
    container.credentials_changed = changed;
    if changed {
        container.credentials = credentials;
        container.last_dag = Some(dag);
    }
    let delta = resource_delta(container, resources);
    for r in &delta {
        container.localized.insert(r.clone());
    }
    container.pending_resource_delta = delta;
}

fn double_assign_error(
    container: &mut Container,
    newcomer: am_common::ids::TaskAttemptId,
) -> Vec<Event> {
    container.state = ContainerState::StopRequested;
    container.is_in_error_state = true;
    let mut events = terminate_occupants_pending(container);
    container.pending_termination.push(newcomer);
    events.push(Event::TaskAttempt(newcomer, TaskAttemptEvent::ContainerTerminating));
    events.push(Event::Nm(NmEvent::StopRequest { container: container.id }));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use am_common::ids::{ApplicationId, ContainerId, DagId, NodeId, TaskAttemptId, TaskId, VertexId};
    use am_core::ResourceSpec;

    fn new_container() -> Container {
        Container::new(
            ContainerId(1),
            NodeId { host: "h".into(), port: 1 },
            ResourceSpec { memory_mb: 1024, vcores: 1 },
        )
    }

    fn attempt_id(n: u32) -> TaskAttemptId {
        let app = ApplicationId(1);
        let dag = DagId { app, dag: 0 };
        let vertex = VertexId { dag, vertex: 0 };
        let task = TaskId::new(vertex, 0);
        TaskAttemptId::new(task, n)
    }

    fn dag_id() -> am_common::ids::DagId {
        DagId { app: ApplicationId(1), dag: 0 }
    }

    fn profile() -> AmConfig {
        AmConfig { task_listener_threads: 1, profile_containers: vec![], profile_jvm_opts: String::new() }
    }

    #[test]
    fn assign_after_launch_ends_idle_with_queued_attempt() {
        let mut c = new_container();
        let events = handle(
            &mut c,
            ContainerEvent::LaunchRequest { resource: c.resource, credentials: None },
            &profile(),
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Nm(NmEvent::LaunchRequest { .. })));

        let events = handle(&mut c, ContainerEvent::Launched, &profile());
        assert!(events.is_empty());
        assert_eq!(c.state, ContainerState::Idle);

        let events = handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(0), dag: dag_id(), resources: vec![], credentials: None },
            &profile(),
        );
        assert!(events.is_empty());
        assert_eq!(c.state, ContainerState::Idle);
        assert_eq!(c.queued, Some(attempt_id(0)));
    }

    #[test]
    fn double_assignment_stops_the_container() {
        let mut c = new_container();
        c.state = ContainerState::Idle;
        handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(0), dag: dag_id(), resources: vec![], credentials: None },
            &profile(),
        );
        let events = handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(1), dag: dag_id(), resources: vec![], credentials: None },
            &profile(),
        );
        assert_eq!(c.state, ContainerState::StopRequested);
        assert!(c.is_in_error_state);
        let terminating = events
            .iter()
            .filter(|e| matches!(e, Event::TaskAttempt(_, TaskAttemptEvent::ContainerTerminating)))
            .count();
        assert_eq!(terminating, 2);
        assert!(events.iter().any(|e| matches!(e, Event::Nm(NmEvent::StopRequest { .. }))));

        handle(&mut c, ContainerEvent::NmStopSent, &profile());
        let events = handle(
            &mut c,
            ContainerEvent::Completed { status: am_core::CompletionStatus::Killed, preempted: false },
            &profile(),
        );
        let terminated = events
            .iter()
            .filter(|e| matches!(e, Event::TaskAttempt(_, TaskAttemptEvent::ContainerTerminated)))
            .count();
        assert_eq!(terminated, 2);
    }

    #[test]
    fn timeout_emits_terminating_not_terminated_until_the_container_actually_completes() {
        let mut c = new_container();
        c.state = ContainerState::Running;
        c.running = Some(attempt_id(0));
        c.attempts_run.push(attempt_id(0));

        let events = handle(&mut c, ContainerEvent::TimedOut, &profile());
        assert_eq!(c.state, ContainerState::StopRequested);
        assert!(c.running.is_none());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::TaskAttempt(_, TaskAttemptEvent::ContainerTerminating)));
        assert!(matches!(events[1], Event::Nm(NmEvent::StopRequest { .. })));

        let events = handle(
            &mut c,
            ContainerEvent::Completed { status: am_core::CompletionStatus::Killed, preempted: false },
            &profile(),
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::TaskAttempt(_, TaskAttemptEvent::ContainerTerminated)));
    }

    #[test]
    fn preemption_during_running_emits_one_event_and_ignores_later_success() {
        let mut c = new_container();
        c.state = ContainerState::Running;
        c.running = Some(attempt_id(0));
        c.attempts_run.push(attempt_id(0));

        let events = handle(&mut c, ContainerEvent::Completed { status: am_core::CompletionStatus::Killed, preempted: true }, &profile());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::TaskAttempt(_, TaskAttemptEvent::ContainerPreempted)));
        assert_eq!(c.state, ContainerState::Completed);

        let events = handle(&mut c, ContainerEvent::TaSucceeded, &profile());
        assert!(events.is_empty());
        assert_eq!(c.state, ContainerState::Completed);
    }

    #[test]
    fn credentials_transfer_across_dags() {
        let mut c = new_container();
        c.state = ContainerState::Idle;
        let dag1 = DagId { app: ApplicationId(1), dag: 1 };
        let dag2 = DagId { app: ApplicationId(1), dag: 2 };
        let dag3 = DagId { app: ApplicationId(1), dag: 3 };
        let mut creds1 = Credentials { dag: dag1, tokens: Default::default() };
        creds1.tokens.insert("tokenDag1".into(), vec![1]);

        handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(0), dag: dag1, resources: vec![], credentials: Some(creds1.clone()) },
            &profile(),
        );
        assert_eq!(c.last_dag, Some(dag1));
        assert!(c.credentials.as_ref().unwrap().tokens.contains_key("tokenDag1"));

        c.queued = None;
        handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(1), dag: dag1, resources: vec![], credentials: None },
            &profile(),
        );
        assert_eq!(c.last_dag, Some(dag1));
        assert!(c.credentials.as_ref().unwrap().tokens.contains_key("tokenDag1"));

        c.queued = None;
        handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(2), dag: dag2, resources: vec![], credentials: None },
            &profile(),
        );
        assert_eq!(c.last_dag, Some(dag2));
        assert!(c.credentials.is_none());

        c.queued = None;
        let mut creds3 = Credentials { dag: dag3, tokens: Default::default() };
        creds3.tokens.insert("tokenDag3".into(), vec![3]);
        handle(
            &mut c,
            ContainerEvent::AssignTa { attempt: attempt_id(3), dag: dag3, resources: vec![], credentials: Some(creds3) },
            &profile(),
        );
        assert_eq!(c.last_dag, Some(dag3));
        let creds = c.credentials.as_ref().unwrap();
        assert!(creds.tokens.contains_key("tokenDag3"));
        assert!(!creds.tokens.contains_key("tokenDag1"));
    }

    #[test]
    fn node_failure_notifies_every_attempt_ever_run() {
        let mut c = new_container();
        c.state = ContainerState::Running;
        c.attempts_run.push(attempt_id(0));
        c.attempts_run.push(attempt_id(1));
        c.running = Some(attempt_id(1));

        let events = handle(&mut c, ContainerEvent::NodeFailed, &profile());
        let node_failed_count = events
            .iter()
            .filter(|e| matches!(e, Event::TaskAttempt(_, TaskAttemptEvent::NodeFailed)))
            .count();
        assert_eq!(node_failed_count, 2);
        assert!(events.iter().any(|e| matches!(e, Event::Rm(RmEvent::ContainerDeallocate { .. }))));
        assert_eq!(c.state, ContainerState::Stopping);
    }
}
