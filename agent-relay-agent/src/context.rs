//! Context builder for assembling prompts

use agent_relay_core::session::ChatMessage;
use agent_relay_providers::{Message, ToolCallRequest};

/// Builds the message list sent to the provider
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
}

impl ContextBuilder {
    /// Create a new context builder around a base system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// Build the system prompt for one conversation
    pub fn build_system_prompt(&self, chat_id: &str) -> String {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");
        format!(
            "{}\n\n## Current Time\n{}\n\n## Current Session\nChat ID: {}",
            self.system_prompt.trim_end(),
            now,
            chat_id
        )
    }

    /// Build the complete message list for an LLM call
    pub fn build_messages(
        &self,
        history: Vec<ChatMessage>,
        current_message: impl Into<String>,
        chat_id: &str,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.build_system_prompt(chat_id))];

        for msg in history {
            let message = match msg.role.as_str() {
                "user" => Message::user(msg.content),
                // Interrupted replies are still context, keep them
                "assistant" if !msg.content.is_empty() => Message::assistant(msg.content),
                _ => continue,
            };
            messages.push(message);
        }

        messages.push(Message::user(current_message));
        messages
    }

    /// Add a tool result to the message list
    pub fn add_tool_result(
        &self,
        messages: &mut Vec<Message>,
        tool_call_id: impl Into<String>,
        result: impl Into<String>,
    ) {
        messages.push(Message::tool(result, tool_call_id));
    }

    /// Add an assistant message with optional tool calls
    pub fn add_assistant_message(
        &self,
        messages: &mut Vec<Message>,
        content: Option<String>,
        tool_calls: Option<Vec<ToolCallRequest>>,
    ) {
        let mut msg = Message::assistant(content.unwrap_or_default());
        msg.tool_calls = tool_calls;
        messages.push(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_system_prompt() {
        let builder = ContextBuilder::new("You are a test assistant.");
        let prompt = builder.build_system_prompt("c1");
        assert!(prompt.starts_with("You are a test assistant."));
        assert!(prompt.contains("Chat ID: c1"));
    }

    #[test]
    fn test_build_messages_replays_history() {
        let builder = ContextBuilder::new("sys");
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("partial").stopped(),
            ChatMessage::assistant(""),
            ChatMessage::new("tool", "ignored"),
        ];
        let messages = builder.build_messages(history, "Hello", "c1");

        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[2].content, "partial");
        assert_eq!(messages[3].content, "Hello");
    }

    #[test]
    fn test_add_tool_result() {
        let builder = ContextBuilder::new("sys");
        let mut messages = vec![Message::user("test")];
        builder.add_tool_result(&mut messages, "call_123", "done");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "tool");
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_123"));
    }
}
