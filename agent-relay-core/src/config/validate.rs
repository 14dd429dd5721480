//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    }
    if config.server.port == 0 {
        errors.push("server.port must be > 0".to_string());
    }

    if config.signal.host.trim().is_empty() {
        errors.push("signal.host must not be empty".to_string());
    }
    if config.signal.key_prefix.trim().is_empty() {
        errors.push("signal.key_prefix must not be empty".to_string());
    }
    if config.signal.ttl_secs == 0 {
        errors.push("signal.ttl_secs must be > 0".to_string());
    }
    if config.signal.timeout_ms == 0 {
        errors.push("signal.timeout_ms must be > 0".to_string());
    }

    if config.session.dir.trim().is_empty() {
        errors.push("session.dir must not be empty".to_string());
    }

    if config.model.model.trim().is_empty() {
        errors.push("model.model must not be empty".to_string());
    }
    if config.model.api_base.trim().is_empty() {
        errors.push("model.api_base must not be empty".to_string());
    }
    if config.model.max_output_tokens == 0 {
        errors.push("model.max_output_tokens must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        errors.push("model.temperature must be in [0.0, 2.0]".to_string());
    }
    if !(0.0..=1.0).contains(&config.model.top_p) {
        errors.push("model.top_p must be in [0.0, 1.0]".to_string());
    }
    if config.model.top_k == Some(0) {
        errors.push("model.top_k must be > 0 when set".to_string());
    }

    if config.agent.max_tool_iterations == 0 {
        errors.push("agent.max_tool_iterations must be > 0".to_string());
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
        errors.push(format!(
            "logging.level must be one of trace, debug, info, warn, error (got '{}')",
            config.logging.level
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
