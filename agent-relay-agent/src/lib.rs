//! Agent logic for agent-relay
//!
//! This crate provides the agent run, context building, the stop watchdog
//! and the cancellable response pipeline.

pub mod context;
pub mod error;
pub mod event;
pub mod fragment;
pub mod orchestrator;
pub mod pipeline;
pub mod run;
pub mod watchdog;

#[cfg(test)]
mod test_support;

pub use error::{AgentError, Result};
pub use event::AgentEvent;
pub use fragment::{ResponseFragment, STOPPED_MARKER};
pub use orchestrator::AgentOrchestrator;
pub use pipeline::{cancellable_stream, FragmentStream, PipelineOptions};
pub use run::{Agent, AgentRun, Generation};
pub use watchdog::{StopWatchdog, WatchState};
