use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// An operation invocation requested by the reasoning function, kept on the
/// assistant message so the conversation can be replayed to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Links a tool-role message back to the call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content: String::new(), tool_calls, tool_call_id: None }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// One conversation thread. Owned by the [`SessionStore`]; callers only ever
/// hold the shared handle, never an independent copy.
#[derive(Debug)]
pub struct Session {
    history: Vec<Message>,
    history_cap: usize,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    fn new(history_cap: usize) -> Self {
        let now = Utc::now();
        Self { history: Vec::new(), history_cap, created_at: now, last_active_at: now }
    }

    /// Appends a message, evicting the oldest non-system entries once the
    /// cap is exceeded so recent context always survives.
    pub fn push(&mut self, message: Message) {
        self.last_active_at = Utc::now();
        self.history.push(message);
        while self.history.len() > self.history_cap {
            let Some(index) = self.history.iter().position(|m| m.role != Role::System) else {
                // History is all system messages; drop the oldest anyway.
                self.history.remove(0);
                continue;
            };
            let evicted = self.history.remove(index);
            // An assistant message and its tool replies form one wire unit;
            // a reply surviving its call (or the reverse) makes the replayed
            // history invalid, so the whole unit goes together.
            for call in &evicted.tool_calls {
                self.history.retain(|m| m.tool_call_id.as_deref() != Some(call.id.as_str()));
            }
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}

/// Shared handle to one session. Locking it serializes turns for that
/// session id; distinct ids run fully in parallel.
pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    history_cap: usize,
    idle_after: Duration,
}

impl SessionStore {
    pub fn new(history_cap: usize, idle_after_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_cap: history_cap.max(1),
            idle_after: Duration::seconds(idle_after_secs as i64),
        }
    }

    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(self.history_cap))))
            .clone()
    }

    pub async fn append(&self, session_id: &str, message: Message) {
        let handle = self.get_or_create(session_id).await;
        handle.lock().await.push(message);
    }

    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let maybe_handle = { self.sessions.lock().await.get(session_id).cloned() };
        match maybe_handle {
            Some(handle) => handle.lock().await.history().to_vec(),
            None => Vec::new(),
        }
    }

    /// Drops the session entirely; the next utterance starts fresh.
    pub async fn clear(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
    }

    /// Evicts sessions idle past the configured window. Returns how many
    /// were removed.
    pub async fn evict_idle(&self) -> usize {
        let cutoff = Utc::now() - self.idle_after;
        let mut sessions = self.sessions.lock().await;
        let mut expired = Vec::new();
        for (id, handle) in sessions.iter() {
            if let Ok(session) = handle.try_lock() {
                if session.last_active_at < cutoff {
                    expired.push(id.clone());
                }
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        expired.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
