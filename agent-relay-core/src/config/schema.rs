//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for agent-relay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Stop-signal store configuration
    #[serde(default)]
    pub signal: SignalConfig,
    /// Session storage configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Response streaming configuration
    #[serde(default)]
    pub stream: StreamConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served as static files (mounted after the API routes)
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> String {
    "static".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

/// Which signal store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignalBackend {
    /// Shared Redis instance
    #[default]
    Redis,
    /// In-process map, only visible to this process
    Memory,
}

/// Stop-signal store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default)]
    pub backend: SignalBackend,
    /// Redis hostname
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// Redis port
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// Redis database number
    #[serde(default)]
    pub db: u32,
    /// Prefix for stop-signal keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Lifetime of a stop signal nobody consumed
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound for a single store round-trip
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Clear the signal when a stream for the conversation finishes
    #[serde(default = "default_true")]
    pub clear_on_finish: bool,
}

fn default_redis_host() -> String {
    "redis".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "stop_signal".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl SignalConfig {
    /// Redis connection URL built from host, port and db
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            backend: SignalBackend::default(),
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            key_prefix: default_key_prefix(),
            ttl_secs: default_ttl_secs(),
            timeout_ms: default_timeout_ms(),
            clear_on_finish: true,
        }
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory for session files
    #[serde(default = "default_session_dir")]
    pub dir: String,
    /// Number of past turns replayed into each generation
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_session_dir() -> String {
    "./data/sessions".to_string()
}

fn default_max_history() -> usize {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            max_history: default_max_history(),
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible API base
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
            top_k: Some(40),
            extra_headers: HashMap::new(),
        }
    }
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Maximum provider round-trips per message
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

fn default_system_prompt() -> String {
    "You are a helpful AI assistant. When asked to stop or if interrupted, \
     use the stop tool immediately. Be concise and helpful."
        .to_string()
}

fn default_max_tool_iterations() -> u32 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

/// Response streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Pause after each agent event so stop checks interleave with output
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

fn default_poll_delay_ms() -> u64 {
    10
}

impl StreamConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: default_poll_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
