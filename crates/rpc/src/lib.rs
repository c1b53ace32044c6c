#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Worker-facing RPC surface plus the resource-manager and node-manager
//! collaborator seams.
//!
//! `codec` defines the wire envelope, `listener` implements the three
//! worker RPCs against the shared engine state, `server` exposes them over
//! TCP, and `rm`/`nm` bridge the dispatcher's two collaborator channels out
//! to whatever real cluster manager a deployment plugs in.

pub mod codec;
pub mod listener;
pub mod nm;
pub mod rm;
pub mod server;

pub use codec::{ContainerContext, ContainerTask, HeartbeatRequest, HeartbeatResponse, Request, Response, TaskDescriptor};
pub use listener::TaskAttemptListener;
pub use nm::{run_nm_communicator, NodeManagerClient, StubNodeManagerClient};
pub use rm::{run_rm_communicator, ResourceManagerClient, StubResourceManagerClient};
pub use server::serve;
