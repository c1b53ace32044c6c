#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared identifiers, error types, configuration, and observability
//! plumbing used across the Application Master workspace.

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};
pub use ids::*;

/// Re-export commonly used external types.
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use uuid::Uuid;
