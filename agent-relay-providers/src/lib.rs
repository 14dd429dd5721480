//! LLM provider integrations for agent-relay
//!
//! This crate provides the provider abstraction the agent streams from and
//! a client for OpenAI-compatible chat completion endpoints.

pub mod base;
pub mod client;

pub use base::{
    GenerationParams, LLMProvider, LLMResponse, LLMStreamEvent, Message, ProviderError,
    ProviderEventStream, ProviderResult, ToolCallRequest,
};
pub use client::ChatCompletionsClient;
