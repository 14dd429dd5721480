//! Core types and traits for agent-relay
//!
//! This crate provides configuration, logging, conversation session
//! storage and the shared stop-signal store used by the other
//! agent-relay components.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod signal;

pub use error::{Error, Result};
