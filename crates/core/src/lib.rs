#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! DAG domain model, the event sum type, and the two plugin seams
//! (`EdgeManager`, `VertexManager`) together with their built-in
//! implementations and the worker-facing wire event types.
//!
//! This crate has no async runtime dependency of its own: state machines
//! and plugins here are pure functions and trait objects driven by
//! `am-engine`'s dispatcher, not actors in their own right.

pub mod edge;
pub mod events;
pub mod model;
pub mod vertex_manager;
pub mod wire;

pub use edge::{by_name as edge_manager_by_name, EdgeManager, RouteMap};
pub use events::{
    CompletionStatus, ContainerEvent, DagEvent, Event, NmEvent, RmEvent, TaskAttemptEvent,
    TaskEvent, VertexEvent,
};
pub use model::{
    assign_distances, build, Container, ContainerState, Credentials, Dag, DagBuildError, DagEdge,
    DagSpec, DagState, EdgeManagerDescriptor, ResourceKey, ResourceSpec, Task, TaskAttempt,
    TaskAttemptState, TaskState, Vertex, VertexManagerDescriptor, VertexSpec, VertexState,
};
pub use vertex_manager::{
    by_name as vertex_manager_by_name, FractionCompletionConfig, FractionCompletionVertexManager,
    ImmediateStartVertexManager, VertexManager, VertexManagerContext,
};
pub use wire::TezEvent;
