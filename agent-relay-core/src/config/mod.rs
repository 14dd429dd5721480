//! Configuration management
//!
//! Handles loading and validation of agent-relay configuration from files
//! and environment variables. The loaded [`Config`] is immutable and is
//! handed to each component when it is constructed.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use schema::*;
