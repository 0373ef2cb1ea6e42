//! One model call under a throwaway session.
//!
//! Every call gets a fresh synthetic session id. Whatever the call does
//! (succeed, fail, time out) the conversation state under that id is deleted
//! afterwards; cleanup errors are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::{Collaborators, ModelHandle, ProviderRegistry};
use crate::error::GenerationError;

/// Default deadline for one model call (5 minutes)
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;

/// Prefix of every synthetic session id.
pub const SESSION_PREFIX: &str = "lifeday-gen-";

pub fn new_session_id() -> String {
    format!("{}{}", SESSION_PREFIX, uuid::Uuid::new_v4())
}

/// True for session ids created by this crate rather than a real user chat.
pub fn is_synthetic_session(session_id: &str) -> bool {
    session_id.starts_with(SESSION_PREFIX)
}

/// The preferred provider when it resolves, otherwise the active one.
pub fn resolve_model(
    providers: &dyn ProviderRegistry,
    preferred: Option<&str>,
) -> Result<Arc<dyn ModelHandle>, GenerationError> {
    if let Some(id) = preferred.filter(|id| !id.is_empty()) {
        if let Some(handle) = providers.by_id(id) {
            return Ok(handle);
        }
        log::warn!("Provider '{}' not found, falling back to the active provider", id);
    }
    providers.active().ok_or(GenerationError::NoProvider)
}

/// Issues model calls with a deadline and guaranteed session cleanup.
pub struct ModelInvoker {
    timeout_secs: u64,
}

impl Default for ModelInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelInvoker {
    pub fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Send `prompt` to `model` and return the completion text.
    pub async fn invoke(
        &self,
        collab: &Collaborators,
        model: &dyn ModelHandle,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        let session_id = new_session_id();
        log::debug!("Calling model '{}' under session {}", model.id(), session_id);

        let deadline = Duration::from_secs(self.timeout_secs);
        let result = match tokio::time::timeout(deadline, model.text_chat(prompt, &session_id)).await
        {
            Ok(Ok(completion)) => Ok(completion.completion_text),
            Ok(Err(e)) => Err(GenerationError::Model(e.to_string())),
            Err(_) => Err(GenerationError::Timeout(self.timeout_secs)),
        };

        if let Err(e) = collab.conversations.delete_conversation(&session_id).await {
            log::debug!("Session cleanup failed for {}: {}", session_id, e);
        }

        result
    }
}
