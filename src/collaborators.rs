//! Capability interfaces for everything outside the generation core.
//!
//! The core only sees these traits; concrete implementations live in
//! `crate::providers` or are supplied by the host.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::BoxedError;

/// Text returned by one chat call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatCompletion {
    pub completion_text: String,
}

/// A resolved model endpoint.
#[async_trait::async_trait]
pub trait ModelHandle: Send + Sync {
    fn id(&self) -> &str;
    async fn text_chat(&self, prompt: &str, session_id: &str) -> Result<ChatCompletion, BoxedError>;
}

/// Resolves model handles by id, or whichever one is currently active.
pub trait ProviderRegistry: Send + Sync {
    fn by_id(&self, id: &str) -> Option<Arc<dyn ModelHandle>>;
    fn active(&self) -> Option<Arc<dyn ModelHandle>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueRole {
    User,
    Assistant,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTurn {
    pub role: DialogueRole,
    pub content: String,
}

impl DialogueTurn {
    pub fn new(role: DialogueRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Shared chat-session storage.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Last `count` turns of the conversation, oldest first.
    async fn recent_dialogue(
        &self,
        conversation_key: &str,
        count: usize,
    ) -> Result<Vec<DialogueTurn>, BoxedError>;

    /// Drop any state created under `session_id`.
    async fn delete_conversation(&self, session_id: &str) -> Result<(), BoxedError>;
}

#[async_trait::async_trait]
pub trait PersonaSource: Send + Sync {
    async fn persona(&self) -> Result<String, BoxedError>;
}

#[async_trait::async_trait]
pub trait HolidaySource: Send + Sync {
    async fn holiday(&self, date: NaiveDate) -> Result<Option<String>, BoxedError>;
}

#[async_trait::async_trait]
pub trait WeatherSource: Send + Sync {
    async fn weather(&self, date: NaiveDate) -> Result<String, BoxedError>;
}

/// Everything the generator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub providers: Arc<dyn ProviderRegistry>,
    pub conversations: Arc<dyn ConversationStore>,
    pub persona: Arc<dyn PersonaSource>,
    pub holidays: Arc<dyn HolidaySource>,
    pub weather: Option<Arc<dyn WeatherSource>>,
}
