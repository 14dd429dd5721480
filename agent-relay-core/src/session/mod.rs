//! Session management for conversation history
//!
//! Sessions store conversation turns in append-only JSONL files so that a
//! restart preserves conversation continuity.

pub mod manager;
pub mod store;

pub use manager::{SessionInfo, SessionManager};
pub use store::{ChatMessage, Session};
