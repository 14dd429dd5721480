//! Fragments of a streamed response

use std::fmt;

/// Text rendering of the terminal stop fragment
pub const STOPPED_MARKER: &str = "[STOPPED]";

/// One unit of streamed output.
///
/// `Stopped` is terminal: nothing follows it on the same stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFragment {
    Content(String),
    Stopped,
}

impl ResponseFragment {
    /// Text as sent to the client
    pub fn as_text(&self) -> &str {
        match self {
            Self::Content(text) => text,
            Self::Stopped => STOPPED_MARKER,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ResponseFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}
