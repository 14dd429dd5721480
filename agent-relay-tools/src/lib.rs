//! Built-in tools for agent-relay
//!
//! This crate provides the tool registry and the `stop` tool the agent
//! uses to end its own generation.

pub mod base;
pub mod registry;
pub mod stop;

pub use base::{Tool, ToolError};
pub use registry::ToolRegistry;
pub use stop::StopTool;
