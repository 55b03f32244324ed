//! Per-chat conversation state
//!
//! Entries are created on first access and live for the whole process.

use ollabot_providers::ChatMessage;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    pub model: Option<String>,
    pub history: Vec<ChatMessage>,
    pub context: Vec<ChatMessage>,
    pub thinking_visible: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            model: None,
            history: Vec::new(),
            context: Vec::new(),
            thinking_visible: true,
        }
    }
}

impl ChatState {
    /// `context ++ history ++ [next]`, the message list sent to the backend.
    pub fn request_with(&self, next: &ChatMessage) -> Vec<ChatMessage> {
        let mut request = Vec::with_capacity(self.context.len() + self.history.len() + 1);
        request.extend(self.context.iter().cloned());
        request.extend(self.history.iter().cloned());
        request.push(next.clone());
        request
    }
}

#[derive(Default)]
pub struct ChatStore {
    chats: Mutex<HashMap<i64, ChatState>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<R>(&self, chat_id: i64, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut chats = self.chats.lock().await;
        f(chats.entry(chat_id).or_default())
    }

    /// Snapshot of the chat, creating a default entry if needed.
    pub async fn get_or_create(&self, chat_id: i64) -> ChatState {
        self.update(chat_id, |state| state.clone()).await
    }

    pub async fn set_model(&self, chat_id: i64, model: impl Into<String>) {
        let model = model.into();
        self.update(chat_id, |state| state.model = Some(model)).await
    }

    pub async fn clear_history(&self, chat_id: i64) {
        self.update(chat_id, |state| state.history.clear()).await
    }

    pub async fn reset_all(&self, chat_id: i64) {
        self.update(chat_id, |state| {
            state.history.clear();
            state.context.clear();
        })
        .await
    }

    pub async fn add_system_context(&self, chat_id: i64, text: impl Into<String>) {
        let message = ChatMessage::system(text);
        self.update(chat_id, |state| state.context.push(message))
            .await
    }

    pub async fn clear_context(&self, chat_id: i64) {
        self.update(chat_id, |state| state.context.clear()).await
    }

    pub async fn set_thinking_visible(&self, chat_id: i64, visible: bool) {
        self.update(chat_id, |state| state.thinking_visible = visible)
            .await
    }

    /// The only way history grows: one user entry then one assistant entry.
    pub async fn append_turn(&self, chat_id: i64, user: ChatMessage, assistant: ChatMessage) {
        self.update(chat_id, |state| {
            state.history.push(user);
            state.history.push(assistant);
        })
        .await
    }

    pub async fn chat_count(&self) -> usize {
        self.chats.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollabot_providers::Role;

    #[tokio::test]
    async fn fresh_chat_has_defaults() {
        let store = ChatStore::new();
        let state = store.get_or_create(1).await;
        assert_eq!(state, ChatState::default());
        assert!(state.thinking_visible);
        assert_eq!(store.chat_count().await, 1);
    }

    #[tokio::test]
    async fn clear_history_keeps_context() {
        let store = ChatStore::new();
        store.add_system_context(1, "be brief").await;
        store
            .append_turn(1, ChatMessage::user("hi"), ChatMessage::assistant("hello"))
            .await;

        store.clear_history(1).await;
        let state = store.get_or_create(1).await;
        assert!(state.history.is_empty());
        assert_eq!(state.context.len(), 1);
        assert_eq!(state.context[0].role, Role::System);

        store.reset_all(1).await;
        let state = store.get_or_create(1).await;
        assert!(state.history.is_empty());
        assert!(state.context.is_empty());
    }

    #[tokio::test]
    async fn request_puts_context_before_history() {
        let store = ChatStore::new();
        store.add_system_context(7, "ctx").await;
        store
            .append_turn(7, ChatMessage::user("q1"), ChatMessage::assistant("a1"))
            .await;
        let state = store.get_or_create(7).await;
        let request = state.request_with(&ChatMessage::user("q2"));
        let roles: Vec<Role> = request.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request[3].content, "q2");
    }

    #[tokio::test]
    async fn chats_are_isolated() {
        let store = ChatStore::new();
        store.set_model(1, "gemma3:4b").await;
        store.set_thinking_visible(1, false).await;
        let other = store.get_or_create(2).await;
        assert_eq!(other.model, None);
        assert!(other.thinking_visible);
        let first = store.get_or_create(1).await;
        assert_eq!(first.model.as_deref(), Some("gemma3:4b"));
        assert!(!first.thinking_visible);
    }
}
