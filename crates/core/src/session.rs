use crate::models::ChatMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const DEFAULT_SESSION_ID: &str = "default";

/// Conversation history keyed by session id. Sessions are created lazily on
/// first use.
#[async_trait]
pub trait SessionStore {
    async fn history(&self, session_id: &str) -> Vec<ChatMessage>;

    async fn append(&self, session_id: &str, turns: Vec<ChatMessage>);

    async fn clear(&self, session_id: &str);
}

/// Process-lifetime history; a restart loses every session.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn append(&self, session_id: &str, turns: Vec<ChatMessage>) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend(turns);
    }

    async fn clear(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_has_empty_history() {
        let store = InMemorySessionStore::new();
        assert!(store.history("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn turns_append_in_order_per_session() {
        let store = InMemorySessionStore::new();
        store
            .append("s1", vec![ChatMessage::user("q1"), ChatMessage::assistant("a1")])
            .await;
        store
            .append("s1", vec![ChatMessage::user("q2"), ChatMessage::assistant("a2")])
            .await;
        store.append("s2", vec![ChatMessage::user("other")]).await;

        let history = store.history("s1").await;
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert_eq!(store.history("s2").await.len(), 1);

        store.clear("s1").await;
        assert!(store.history("s1").await.is_empty());
        assert_eq!(store.history("s2").await.len(), 1);
    }
}
