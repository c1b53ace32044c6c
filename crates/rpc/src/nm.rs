//! Node-manager collaborator seam: launching and stopping containers on
//! whatever node runtime backs a deployment. Out of scope to implement for
//! real (non-goal (a)), so only the stub and the communicator loop live
//! here, mirroring [`crate::rm`].

use am_common::ids::ContainerId;
use am_core::{ContainerEvent, Credentials, Event, NmEvent, ResourceSpec};
use am_engine::EventBus;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[async_trait]
pub trait NodeManagerClient: Send + Sync {
    async fn launch_container(
        &self,
        container: ContainerId,
        resource: ResourceSpec,
        credentials: Option<Credentials>,
        launch_command: String,
    ) -> Vec<Event>;

    async fn stop_container(&self, container: ContainerId) -> Vec<Event>;
}

/// Reports every launch as immediately successful and every stop as sent.
pub struct StubNodeManagerClient;

#[async_trait]
impl NodeManagerClient for StubNodeManagerClient {
    async fn launch_container(
        &self,
        container: ContainerId,
        _resource: ResourceSpec,
        _credentials: Option<Credentials>,
        _launch_command: String,
    ) -> Vec<Event> {
        vec![Event::Container(container, ContainerEvent::Launched)]
    }

    async fn stop_container(&self, container: ContainerId) -> Vec<Event> {
        vec![Event::Container(container, ContainerEvent::NmStopSent)]
    }
}

pub async fn run_nm_communicator(mut rx: mpsc::UnboundedReceiver<NmEvent>, bus: EventBus, client: Arc<dyn NodeManagerClient>) {
    while let Some(event) = rx.recv().await {
        let events = match event {
            NmEvent::LaunchRequest { container, resource, credentials, launch_command } => {
                client.launch_container(container, resource, credentials, launch_command).await
            }
            NmEvent::StopRequest { container } => client.stop_container(container).await,
        };
        for ev in events {
            bus.handle(ev);
        }
    }
    debug!("nm communicator channel closed, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_launch_reports_launched() {
        let client = StubNodeManagerClient;
        let events = client
            .launch_container(ContainerId(1), ResourceSpec { memory_mb: 512, vcores: 1 }, None, "worker".into())
            .await;
        assert!(matches!(events.as_slice(), [Event::Container(id, ContainerEvent::Launched)] if *id == ContainerId(1)));
    }

    #[tokio::test]
    async fn stub_stop_reports_stop_sent() {
        let client = StubNodeManagerClient;
        let events = client.stop_container(ContainerId(7)).await;
        assert!(matches!(events.as_slice(), [Event::Container(id, ContainerEvent::NmStopSent)] if *id == ContainerId(7)));
    }
}
