//! Events produced by an agent run

/// Progress reported by an agent run, in generation order
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A provider round-trip is starting
    IterationStarted { index: u32, max_iterations: u32 },
    /// Incremental assistant text
    AssistantDelta { text: String },
    /// A tool call is about to run
    ToolCallStarted {
        name: String,
        args_preview: String,
        call_id: String,
    },
    /// A tool call returned
    ToolCallFinished {
        name: String,
        result: String,
        is_error: bool,
        call_id: String,
    },
    /// The run finished; carries the full assistant reply
    FinalResponse { content: String },
}

impl AgentEvent {
    /// Client-visible text carried by the event, if any
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::AssistantDelta { text } if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}
