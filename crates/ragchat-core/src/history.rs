//! Rolling conversation history sent back to the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::ContextRef;
use crate::message::Role;

/// One finalized turn as it appears in outgoing requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author of the turn.
    pub role: Role,
    /// Turn text. For assistant turns this is the visible answer only.
    pub content: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
    /// Documents attached to an assistant answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<ContextRef>,
}

impl HistoryEntry {
    /// A user turn.
    #[must_use]
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
            context: Vec::new(),
        }
    }

    /// An assistant turn with its supporting documents.
    #[must_use]
    pub fn assistant(
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        context: Vec<ContextRef>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp,
            context,
        }
    }
}

/// Append-only list of finalized turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    entries: Vec<HistoryEntry>,
}

impl ConversationHistory {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn append(&mut self, entry: HistoryEntry) {
        tracing::debug!(role = entry.role.as_str(), len = entry.content.len(), "History append");
        self.entries.push(entry);
    }

    /// The entries in order, as sent with the next request.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.clone()
    }

    /// Borrow the entries.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no turn has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
