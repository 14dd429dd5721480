//! Session manager for handling multiple sessions

use super::store::{ChatMessage, Session};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manages conversation sessions.
///
/// Each conversation is one JSONL file: a metadata line followed by one
/// line per turn. Turns are only ever appended, so a file replays the
/// conversation in request order.
#[derive(Debug)]
pub struct SessionManager {
    /// Sessions directory
    sessions_dir: PathBuf,
    /// In-memory cache of sessions
    cache: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create a new session manager storing files directly under `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            sessions_dir: dir.as_ref().to_path_buf(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Directory the session files live in
    pub fn dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Get a session, reading it from disk on first access.
    ///
    /// Unknown conversations yield an empty session that is not written
    /// until the first turn is appended.
    pub fn load(&self, key: &str) -> Session {
        let mut cache = self.cache.lock();
        if let Some(session) = cache.get(key) {
            return session.clone();
        }

        match self.read_from_disk(key) {
            Some(session) => {
                cache.insert(key.to_string(), session.clone());
                session
            }
            None => Session::new(key),
        }
    }

    /// Most recent `max_messages` turns of a conversation
    pub fn history(&self, key: &str, max_messages: usize) -> Vec<ChatMessage> {
        self.load(key).get_history(max_messages)
    }

    /// Whether any turn was ever stored for the conversation
    pub fn exists(&self, key: &str) -> bool {
        self.cache.lock().contains_key(key) || self.session_path(key).exists()
    }

    /// Append a turn to a conversation and persist it
    pub fn append(&self, key: &str, message: ChatMessage) -> crate::Result<()> {
        let mut cache = self.cache.lock();
        if !cache.contains_key(key) {
            let session = self
                .read_from_disk(key)
                .unwrap_or_else(|| Session::new(key));
            cache.insert(key.to_string(), session);
        }

        std::fs::create_dir_all(&self.sessions_dir)?;
        let path = self.session_path(key);
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            let created_at = cache
                .get(key)
                .map(|s| s.created_at)
                .unwrap_or_else(chrono::Utc::now);
            let metadata = serde_json::json!({
                "_type": "metadata",
                "key": key,
                "created_at": created_at.to_rfc3339(),
            });
            writeln!(file, "{}", serde_json::to_string(&metadata)?)?;
        }
        writeln!(file, "{}", serde_json::to_string(&message)?)?;
        debug!("chat_id=<{}> | Appended {} turn", key, message.role);

        if let Some(session) = cache.get_mut(key) {
            session.push(message);
        }
        Ok(())
    }

    /// Delete a session
    pub fn delete(&self, key: &str) -> crate::Result<bool> {
        self.cache.lock().remove(key);

        let path = self.session_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// List all stored sessions, most recently modified first
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = Vec::new();

        let Ok(entries) = std::fs::read_dir(&self.sessions_dir) else {
            return sessions;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Some(header) = content
                .lines()
                .next()
                .and_then(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter(|v| v.get("_type").and_then(|t| t.as_str()) == Some("metadata"))
            else {
                continue;
            };

            let updated_at = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

            sessions.push(SessionInfo {
                key: header
                    .get("key")
                    .and_then(|k| k.as_str())
                    .unwrap_or_default()
                    .to_string(),
                created_at: header
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                updated_at,
                turns: content.lines().skip(1).filter(|l| !l.trim().is_empty()).count(),
                path: path.to_string_lossy().to_string(),
            });
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    fn read_from_disk(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key);
        let content = std::fs::read_to_string(&path).ok()?;

        let mut session = Session::new(key);
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                warn!("chat_id=<{}> | Skipping corrupt session line {}", key, line_no + 1);
                continue;
            };
            if value.get("_type").and_then(|v| v.as_str()) == Some("metadata") {
                if let Some(created_at) = value
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                {
                    session.created_at = created_at;
                }
            } else if let Ok(msg) = serde_json::from_value::<ChatMessage>(value) {
                session.push(msg);
            }
        }

        Some(session)
    }

    /// Get the file path for a session
    fn session_path(&self, key: &str) -> PathBuf {
        self.sessions_dir.join(format!("{}.jsonl", encode_key(key)))
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9_-]` so that distinct
/// keys always map to distinct file names
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Information about a session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Session key
    pub key: String,
    /// Creation time
    pub created_at: Option<String>,
    /// Last modification time of the file
    pub updated_at: Option<String>,
    /// Number of stored turns
    pub turns: usize,
    /// File path
    pub path: String,
}
