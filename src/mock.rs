//! Scripted collaborators for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::collaborators::{
    ChatCompletion, Collaborators, ConversationStore, DialogueTurn, HolidaySource, ModelHandle,
    PersonaSource, WeatherSource,
};
use crate::error::BoxedError;
use crate::providers::{MemoryConversations, StaticProviders};
use crate::state::AppState;
use crate::types::Config;

/// One scripted reply: text or an error.
pub enum MockReply {
    Text(String),
    Error(String),
}

/// Model that replays queued replies in order and records every call.
pub struct ScriptedModel {
    id: String,
    replies: Mutex<VecDeque<MockReply>>,
    pub prompts: Mutex<Vec<String>>,
    pub sessions: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(id: &str, replies: Vec<MockReply>) -> Self {
        Self {
            id: id.to_string(),
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn texts(id: &str, replies: &[&str]) -> Self {
        Self::new(
            id,
            replies.iter().map(|r| MockReply::Text(r.to_string())).collect(),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait::async_trait]
impl ModelHandle for ScriptedModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn text_chat(&self, prompt: &str, session_id: &str) -> Result<ChatCompletion, BoxedError> {
        self.prompts.lock().push(prompt.to_string());
        self.sessions.lock().push(session_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(ChatCompletion {
                completion_text: text,
            }),
            Some(MockReply::Error(message)) => Err(message.into()),
            None => Err("no scripted reply left".into()),
        }
    }
}

/// Conversation store that counts deletions and can be told to fail.
#[derive(Default)]
pub struct CountingConversations {
    pub inner: MemoryConversations,
    pub deleted: Mutex<Vec<String>>,
    pub fail_reads: bool,
    pub fail_deletes: bool,
}

#[async_trait::async_trait]
impl ConversationStore for CountingConversations {
    async fn recent_dialogue(
        &self,
        conversation_key: &str,
        count: usize,
    ) -> Result<Vec<DialogueTurn>, BoxedError> {
        if self.fail_reads {
            return Err("history backend down".into());
        }
        self.inner.recent_dialogue(conversation_key, count).await
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<(), BoxedError> {
        self.deleted.lock().push(session_id.to_string());
        if self.fail_deletes {
            return Err("delete failed".into());
        }
        self.inner.delete_conversation(session_id).await
    }
}

pub struct FixedPersona(pub Result<String, String>);

#[async_trait::async_trait]
impl PersonaSource for FixedPersona {
    async fn persona(&self) -> Result<String, BoxedError> {
        self.0.clone().map_err(Into::into)
    }
}

pub struct FixedHoliday(pub Result<Option<String>, String>);

#[async_trait::async_trait]
impl HolidaySource for FixedHoliday {
    async fn holiday(&self, _date: NaiveDate) -> Result<Option<String>, BoxedError> {
        self.0.clone().map_err(Into::into)
    }
}

pub struct FixedWeather(pub Result<String, String>);

#[async_trait::async_trait]
impl WeatherSource for FixedWeather {
    async fn weather(&self, _date: NaiveDate) -> Result<String, BoxedError> {
        self.0.clone().map_err(Into::into)
    }
}

/// Collaborators wired to a single scripted model with quiet defaults.
pub fn collaborators_with(
    model: Arc<ScriptedModel>,
    conversations: Arc<CountingConversations>,
) -> Collaborators {
    Collaborators {
        providers: Arc::new(StaticProviders::new().with(model)),
        conversations,
        persona: Arc::new(FixedPersona(Ok("A cheerful librarian who loves tea.".to_string()))),
        holidays: Arc::new(FixedHoliday(Ok(None))),
        weather: None,
    }
}

/// App state rooted in `dir` (config and data files side by side).
pub fn test_state(dir: &Path, config: Config, model: Arc<ScriptedModel>) -> AppState {
    AppState::new(
        dir.join("config.json"),
        config,
        collaborators_with(model, Arc::new(CountingConversations::default())),
    )
}
