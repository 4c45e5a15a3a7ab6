//! Per-process session identity.
//!
//! Each server process serves one conversation; the id is minted once at
//! startup and passed explicitly into every store call that records
//! provenance. There is no ambient current-conversation global.

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionContext {
    conversation_id: String,
}

impl SessionContext {
    /// Mint a fresh conversation id for this server session.
    pub fn new() -> Self {
        Self {
            conversation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Session bound to a known conversation id (tests, replay).
    pub fn with_conversation_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
