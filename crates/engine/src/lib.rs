#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! The application master's event-driven runtime: entity registry, the
//! single-dispatch event bus, and the five state machines it drives
//! (container, task attempt, task, vertex, dag).
//!
//! Nothing in this crate talks to the network or the filesystem — that is
//! `am-rpc`'s job. This crate only answers "given this entity and this
//! event, what state does it end up in and what happens next".

pub mod attempt_sm;
pub mod bus;
pub mod container_sm;
pub mod dag_sm;
pub mod registry;
pub mod scheduler;
pub mod submit;
pub mod task_sm;
pub mod vertex_sm;

pub use bus::{new as new_bus, CommunicatorChannels, Dispatcher, EventBus};
pub use registry::Registry;
pub use scheduler::{base_priority, AskQueue};
pub use submit::{submit_dag, SubmitError};
