//! Application-level orchestration.
//!
//! This module owns the job lifecycle (start/cancel/quit), line classification
//! and the gateway through which presentation layers observe a job. UI/CLI
//! layers call into this module to keep responsibilities separated.

mod classify;
mod controller;
mod gateway;

pub use controller::JobController;
#[cfg(feature = "tui")]
pub(crate) use controller::{run_controller, UiCommand};
#[cfg(feature = "tui")]
pub use gateway::ChannelGateway;
pub use gateway::PresentationGateway;
