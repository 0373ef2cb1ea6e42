//! Standalone implementations of the collaborator traits.
//!
//! Used by the `lifeday` binary: an OpenAI-compatible chat endpoint, an in-memory
//! conversation store, and config-backed persona and holiday tables.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;

use crate::collaborators::{
    ChatCompletion, ConversationStore, DialogueTurn, HolidaySource, ModelHandle, PersonaSource,
    ProviderRegistry,
};
use crate::error::BoxedError;
use crate::types::ProviderConfig;

// =============================================================================
// Model providers
// =============================================================================

/// Chat model reached over an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatModel {
    id: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatModel {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());
        Self {
            id: config.id.clone(),
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl ModelHandle for OpenAiCompatModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn text_chat(&self, prompt: &str, session_id: &str) -> Result<ChatCompletion, BoxedError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "user": session_id,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", url, status, text).into());
        }

        let parsed: ChatResponse = response.json().await?;
        let completion_text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or("response contained no choices")?;

        Ok(ChatCompletion { completion_text })
    }
}

/// Fixed set of model handles with one designated active handle.
#[derive(Default)]
pub struct StaticProviders {
    handles: HashMap<String, Arc<dyn ModelHandle>>,
    active: Option<String>,
}

impl StaticProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle. The first registered handle becomes active.
    pub fn with(mut self, handle: Arc<dyn ModelHandle>) -> Self {
        let id = handle.id().to_string();
        if self.active.is_none() {
            self.active = Some(id.clone());
        }
        self.handles.insert(id, handle);
        self
    }

    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        configs.iter().fold(Self::new(), |registry, config| {
            registry.with(Arc::new(OpenAiCompatModel::from_config(config)))
        })
    }
}

impl ProviderRegistry for StaticProviders {
    fn by_id(&self, id: &str) -> Option<Arc<dyn ModelHandle>> {
        self.handles.get(id).cloned()
    }

    fn active(&self) -> Option<Arc<dyn ModelHandle>> {
        self.active.as_deref().and_then(|id| self.by_id(id))
    }
}

// =============================================================================
// Conversations
// =============================================================================

/// Process-local conversation history.
#[derive(Default)]
pub struct MemoryConversations {
    sessions: Mutex<HashMap<String, Vec<DialogueTurn>>>,
}

impl MemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, conversation_key: &str, turn: DialogueTurn) {
        self.sessions
            .lock()
            .entry(conversation_key.to_string())
            .or_default()
            .push(turn);
    }

    pub fn contains(&self, conversation_key: &str) -> bool {
        self.sessions.lock().contains_key(conversation_key)
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversations {
    async fn recent_dialogue(
        &self,
        conversation_key: &str,
        count: usize,
    ) -> Result<Vec<DialogueTurn>, BoxedError> {
        let sessions = self.sessions.lock();
        let turns = sessions.get(conversation_key).map(Vec::as_slice).unwrap_or(&[]);
        let start = turns.len().saturating_sub(count);
        Ok(turns[start..].to_vec())
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<(), BoxedError> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }
}

// =============================================================================
// Persona + holidays
// =============================================================================

/// Persona text taken from configuration. Errors when none is configured.
pub struct StaticPersona(pub Option<String>);

#[async_trait::async_trait]
impl PersonaSource for StaticPersona {
    async fn persona(&self) -> Result<String, BoxedError> {
        match self.0.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err("no persona configured".into()),
        }
    }
}

/// Holiday names keyed by `YYYY-MM-DD` (one-off) or `MM-DD` (every year).
pub struct CalendarHolidays {
    names: BTreeMap<String, String>,
}

impl CalendarHolidays {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        Self { names }
    }
}

#[async_trait::async_trait]
impl HolidaySource for CalendarHolidays {
    async fn holiday(&self, date: NaiveDate) -> Result<Option<String>, BoxedError> {
        let full = date.format("%Y-%m-%d").to_string();
        let yearly = date.format("%m-%d").to_string();
        Ok(self
            .names
            .get(&full)
            .or_else(|| self.names.get(&yearly))
            .cloned())
    }
}
