//! The chat message record.
//!
//! A [`Message`] is mutated only by the state machine in [`crate::session`];
//! everything else reads it. Text buckets are append-only while the message
//! streams, so re-rendering the same record is always idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::ContextRef;
use crate::ids::MessageId;

/// Headline shown for a reasoning block that is finished.
pub const REASONING_DONE_HEADLINE: &str = "Reasoning";

/// Headline shown while reasoning has started but has no sentence yet.
pub const REASONING_PENDING_HEADLINE: &str = "Analyzing the question...";

/// Longest live reasoning headline, in characters.
const HEADLINE_MAX_CHARS: usize = 50;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the client.
    User,
    /// The remote assistant.
    Assistant,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: MessageId,
    role: Role,
    visible_text: String,
    reasoning_text: String,
    reasoning_closed: bool,
    is_streaming: bool,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    retrieved_context: Vec<ContextRef>,
    context_count: u32,
    failed: bool,
}

impl Message {
    /// A completed user message.
    #[must_use]
    pub fn user(id: MessageId, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role: Role::User,
            visible_text: text.into(),
            reasoning_text: String::new(),
            reasoning_closed: false,
            is_streaming: false,
            started_at: now,
            completed_at: Some(now),
            retrieved_context: Vec::new(),
            context_count: 0,
            failed: false,
        }
    }

    /// An empty assistant message that is about to stream.
    #[must_use]
    pub fn streaming_assistant(id: MessageId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            visible_text: String::new(),
            reasoning_text: String::new(),
            reasoning_closed: false,
            is_streaming: true,
            started_at: now,
            completed_at: None,
            retrieved_context: Vec::new(),
            context_count: 0,
            failed: false,
        }
    }

    /// Message identifier.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Author.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Whether this is a user message.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// The answer text shown to the user.
    #[must_use]
    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }

    /// Accumulated reasoning, without delimiter tokens.
    #[must_use]
    pub fn reasoning_text(&self) -> &str {
        &self.reasoning_text
    }

    /// Whether any reasoning was received.
    #[must_use]
    pub fn has_reasoning(&self) -> bool {
        !self.reasoning_text.trim().is_empty()
    }

    /// Whether the reasoning segment is finished: its close delimiter was
    /// seen, or the message is no longer streaming.
    #[must_use]
    pub const fn is_reasoning_complete(&self) -> bool {
        self.reasoning_closed || !self.is_streaming
    }

    /// Whether the message is still receiving frames.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Whether the message ended with a transport failure or a cancel.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.failed
    }

    /// When the message was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the message stopped streaming.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Supporting documents from the latest context frame.
    #[must_use]
    pub fn retrieved_context(&self) -> &[ContextRef] {
        &self.retrieved_context
    }

    /// Document count reported by the latest context frame.
    #[must_use]
    pub const fn context_count(&self) -> u32 {
        self.context_count
    }

    /// Time between creation and completion.
    #[must_use]
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    /// Processing time as seconds with one decimal, e.g. `"2.4s"`.
    #[must_use]
    pub fn processing_time_label(&self) -> Option<String> {
        self.processing_time().map(|d| {
            #[allow(clippy::cast_precision_loss)]
            let secs = d.num_milliseconds().max(0) as f64 / 1000.0;
            format!("{secs:.1}s")
        })
    }

    /// One-line headline for the reasoning block.
    ///
    /// While reasoning is still arriving this is the most recent sentence,
    /// shortened to fit a single line; once reasoning is complete it is a
    /// fixed label.
    #[must_use]
    pub fn reasoning_headline(&self) -> String {
        if self.is_reasoning_complete() {
            return REASONING_DONE_HEADLINE.to_string();
        }

        let last = self
            .reasoning_text
            .split(['.', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .last();

        match last {
            Some(sentence) if sentence.chars().count() > HEADLINE_MAX_CHARS => {
                let cut: String = sentence.chars().take(HEADLINE_MAX_CHARS - 3).collect();
                format!("{cut}...")
            }
            Some(sentence) => sentence.to_string(),
            None => REASONING_PENDING_HEADLINE.to_string(),
        }
    }

    // -------------------------------------------------------------------------
    // Mutation (state machine only)
    // -------------------------------------------------------------------------

    pub(crate) fn push_visible(&mut self, text: &str) {
        debug_assert!(self.is_streaming, "visible text appended after completion");
        self.visible_text.push_str(text);
    }

    pub(crate) fn push_reasoning(&mut self, text: &str) {
        debug_assert!(self.is_streaming, "reasoning appended after completion");
        self.reasoning_text.push_str(text);
    }

    pub(crate) fn open_reasoning(&mut self) {
        self.reasoning_closed = false;
    }

    pub(crate) fn close_reasoning(&mut self) {
        self.reasoning_closed = true;
    }

    pub(crate) fn replace_context(&mut self, refs: Vec<ContextRef>, count: u32) {
        self.retrieved_context = refs;
        self.context_count = count;
    }

    /// Stop streaming. `completed_at` is set here and nowhere else.
    pub(crate) fn complete(&mut self, now: DateTime<Utc>) {
        if !self.is_streaming {
            return;
        }
        self.is_streaming = false;
        self.completed_at = Some(now);
    }

    /// Stop streaming with a failure. `notice`, when given, replaces the
    /// visible text.
    pub(crate) fn fail(&mut self, notice: Option<&str>, now: DateTime<Utc>) {
        if !self.is_streaming {
            return;
        }
        if let Some(notice) = notice {
            self.visible_text = notice.to_string();
        }
        self.failed = true;
        self.complete(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn assistant() -> Message {
        Message::streaming_assistant(MessageId::from_raw(2), t(0))
    }

    #[test]
    fn user_message_is_complete_on_creation() {
        let msg = Message::user(MessageId::from_raw(1), "hi", t(0));
        assert!(msg.is_user());
        assert!(!msg.is_streaming());
        assert_eq!(msg.completed_at(), Some(t(0)));
    }

    #[test]
    fn complete_sets_timestamp_once() {
        let mut msg = assistant();
        assert!(msg.completed_at().is_none());
        msg.complete(t(2_400));
        msg.complete(t(9_000));
        assert_eq!(msg.completed_at(), Some(t(2_400)));
        assert_eq!(msg.processing_time_label().as_deref(), Some("2.4s"));
    }

    #[test]
    fn fail_replaces_text_with_notice() {
        let mut msg = assistant();
        msg.push_visible("partial");
        msg.fail(Some("Connection failed"), t(10));
        assert_eq!(msg.visible_text(), "Connection failed");
        assert!(msg.is_failed());
        assert!(!msg.is_streaming());
    }

    #[test]
    fn fail_without_notice_keeps_partial_text() {
        let mut msg = assistant();
        msg.push_visible("partial");
        msg.fail(None, t(10));
        assert_eq!(msg.visible_text(), "partial");
    }

    #[test]
    fn headline_tracks_last_sentence_while_streaming() {
        let mut msg = assistant();
        assert_eq!(msg.reasoning_headline(), REASONING_PENDING_HEADLINE);
        msg.push_reasoning("First I read the policy. Then I compare the dates");
        assert_eq!(msg.reasoning_headline(), "Then I compare the dates");
        msg.push_reasoning(".\n");
        assert_eq!(msg.reasoning_headline(), "Then I compare the dates");
    }

    #[test]
    fn headline_truncates_long_sentence() {
        let mut msg = assistant();
        msg.push_reasoning(&"x".repeat(80));
        let headline = msg.reasoning_headline();
        assert_eq!(headline.chars().count(), 50);
        assert!(headline.ends_with("..."));
    }

    #[test]
    fn headline_is_fixed_once_reasoning_closes() {
        let mut msg = assistant();
        msg.push_reasoning("thinking");
        msg.close_reasoning();
        assert!(msg.is_reasoning_complete());
        assert_eq!(msg.reasoning_headline(), REASONING_DONE_HEADLINE);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.as_str(), "user");
    }
}
