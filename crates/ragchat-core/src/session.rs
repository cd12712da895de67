//! The message state machine.
//!
//! [`Conversation`] owns every message and the history. A submit opens a
//! stream session bound to one new assistant message; frames are applied to
//! that message until a terminal frame, the end of the body, a transport
//! failure, or a cancel closes the session.
//!
//! ```text
//! Idle ──submit──▶ Streaming ──done / end of body──▶ Finalized
//!                      │
//!                      └──transport error / cancel──▶ Failed
//! ```
//!
//! `Finalized` and `Failed` accept the next submit.

use chrono::{DateTime, Utc};

use crate::error::{SubmitError, TransportError};
use crate::frame::{ContextRef, Frame};
use crate::history::{ConversationHistory, HistoryEntry};
use crate::ids::{IdAllocator, MessageId};
use crate::message::Message;
use crate::splitter::{Delimiters, Segment, ThinkingSplitter};
use crate::transport::ChatRequest;

/// Notice shown in place of an answer whose transport failed.
pub const CONNECTION_FAILED_NOTICE: &str = "Connection failed, please retry.";

/// Lifecycle state of the most recent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Nothing has been submitted yet.
    Idle,
    /// A response is streaming.
    Streaming,
    /// The last response completed.
    Finalized,
    /// The last response failed or was cancelled.
    Failed,
}

/// What an input did to the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing changed: a stale event or one with no payload.
    Ignored,
    /// The streaming message was updated.
    Updated(MessageId),
    /// The session ended normally.
    Finalized(MessageId),
    /// The session ended with a failure or a cancel.
    Failed(MessageId),
}

impl Change {
    /// Whether any message changed and needs re-rendering.
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        !matches!(self, Self::Ignored)
    }

    /// Whether this change closed the session.
    #[must_use]
    pub const fn ends_session(self) -> bool {
        matches!(self, Self::Finalized(_) | Self::Failed(_))
    }
}

/// State of the one in-flight request.
#[derive(Debug)]
struct StreamSession {
    message_id: MessageId,
    splitter: ThinkingSplitter,
    buffered_context: Vec<ContextRef>,
    user_text: String,
    user_at: DateTime<Utc>,
    frames: usize,
}

/// Messages, history, and the active session.
#[derive(Debug)]
pub struct Conversation {
    delimiters: Delimiters,
    ids: IdAllocator,
    messages: Vec<Message>,
    history: ConversationHistory,
    state: ChatState,
    session: Option<StreamSession>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(Delimiters::default())
    }
}

impl Conversation {
    /// Create an empty conversation that splits reasoning on `delimiters`.
    #[must_use]
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            ids: IdAllocator::new(),
            messages: Vec::new(),
            history: ConversationHistory::new(),
            state: ChatState::Idle,
            session: None,
        }
    }

    /// State of the most recent session.
    #[must_use]
    pub const fn state(&self) -> ChatState {
        self.state
    }

    /// Whether a response is streaming.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.session.is_some()
    }

    /// All messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.id() == id)
    }

    /// ID of the message the active session writes to.
    #[must_use]
    pub fn active_message_id(&self) -> Option<MessageId> {
        self.session.as_ref().map(|s| s.message_id)
    }

    /// Finalized turns.
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Start a session for `text`.
    ///
    /// Appends the user message and an empty streaming assistant message and
    /// returns the request to send. The history in the request holds only
    /// earlier turns.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Busy`] while a session is active and
    /// [`SubmitError::Blank`] for empty input. Neither changes any state.
    pub fn submit(
        &mut self,
        text: &str,
        category_filter: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ChatRequest, SubmitError> {
        if self.session.is_some() {
            return Err(SubmitError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::Blank);
        }

        let request = ChatRequest {
            query: text.to_string(),
            main_category_filter: category_filter.filter(|c| !c.trim().is_empty()),
            conversation_history: self.history.snapshot(),
            reranker_type: None,
        };

        let user_id = self.ids.next_id();
        self.messages.push(Message::user(user_id, text, now));

        let message_id = self.ids.next_id();
        self.messages
            .push(Message::streaming_assistant(message_id, now));

        self.session = Some(StreamSession {
            message_id,
            splitter: ThinkingSplitter::new(self.delimiters.clone()),
            buffered_context: Vec::new(),
            user_text: text.to_string(),
            user_at: now,
            frames: 0,
        });
        self.state = ChatState::Streaming;

        tracing::debug!(
            message_id = %message_id,
            history = request.conversation_history.len(),
            "Session started"
        );
        Ok(request)
    }

    /// Apply one decoded frame addressed to message `id`.
    pub fn apply(&mut self, id: MessageId, frame: Frame, now: DateTime<Utc>) -> Change {
        if !self.is_active(id) {
            tracing::debug!(message_id = %id, kind = frame.kind(), "Ignoring frame for inactive session");
            return Change::Ignored;
        }
        if let Some(session) = self.session.as_mut() {
            session.frames += 1;
        }

        match frame {
            Frame::Thinking { content } => match content.filter(|c| !c.is_empty()) {
                Some(text) => {
                    self.with_active(|msg, _| msg.push_reasoning(&text));
                    Change::Updated(id)
                }
                None => Change::Ignored,
            },
            Frame::Content { content } => match content.filter(|c| !c.is_empty()) {
                Some(text) => {
                    self.with_active(|msg, session| {
                        let segments = session.splitter.push(&text);
                        apply_segments(msg, segments);
                    });
                    Change::Updated(id)
                }
                None => Change::Ignored,
            },
            Frame::Context {
                context,
                context_count,
            } => {
                let refs = context.unwrap_or_default();
                let count = context_count
                    .unwrap_or_else(|| u32::try_from(refs.len()).unwrap_or(u32::MAX));
                tracing::debug!(message_id = %id, refs = refs.len(), count, "Context attached");
                self.with_active(|msg, session| {
                    session.buffered_context.clone_from(&refs);
                    msg.replace_context(refs, count);
                });
                Change::Updated(id)
            }
            Frame::Done | Frame::StreamEnd => self.finalize(now),
        }
    }

    /// The body of message `id` ended.
    ///
    /// A stream that closes without a terminal frame is finalized as if
    /// `done` had arrived.
    pub fn finish_stream(&mut self, id: MessageId, now: DateTime<Utc>) -> Change {
        if !self.is_active(id) {
            return Change::Ignored;
        }
        let frames = self.session.as_ref().map_or(0, |s| s.frames);
        tracing::debug!(message_id = %id, frames, "Stream closed without terminal frame");
        self.finalize(now)
    }

    /// The transport for message `id` failed.
    ///
    /// The answer is replaced by [`CONNECTION_FAILED_NOTICE`], except for
    /// [`TransportError::Cancelled`], which keeps the partial text.
    pub fn fail(&mut self, id: MessageId, error: &TransportError, now: DateTime<Utc>) -> Change {
        if !self.is_active(id) {
            return Change::Ignored;
        }
        tracing::warn!(message_id = %id, error = %error, "Session failed");
        let notice = match error {
            TransportError::Cancelled => None,
            _ => Some(CONNECTION_FAILED_NOTICE),
        };
        self.close_failed(notice, now)
    }

    /// Abort the active session, keeping whatever text has arrived.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Change {
        if self.session.is_none() {
            return Change::Ignored;
        }
        tracing::debug!("Session cancelled");
        self.close_failed(None, now)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn is_active(&self, id: MessageId) -> bool {
        self.session.as_ref().is_some_and(|s| s.message_id == id)
    }

    fn with_active<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Message, &mut StreamSession),
    {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = session.message_id;
        if let Some(msg) = self.messages.iter_mut().rev().find(|m| m.id() == id) {
            f(msg, session);
        }
    }

    fn finalize(&mut self, now: DateTime<Utc>) -> Change {
        let Some(mut session) = self.session.take() else {
            return Change::Ignored;
        };
        let id = session.message_id;
        let Some(msg) = self.messages.iter_mut().rev().find(|m| m.id() == id) else {
            return Change::Ignored;
        };

        let tail = session.splitter.finish();
        apply_segments(msg, tail);
        msg.complete(now);

        if msg.visible_text().trim().is_empty() {
            tracing::debug!(message_id = %id, "Empty answer, history unchanged");
        } else {
            self.history
                .append(HistoryEntry::user(session.user_text, session.user_at));
            self.history.append(HistoryEntry::assistant(
                msg.visible_text(),
                now,
                session.buffered_context,
            ));
        }

        self.state = ChatState::Finalized;
        tracing::debug!(message_id = %id, frames = session.frames, "Session finalized");
        Change::Finalized(id)
    }

    fn close_failed(&mut self, notice: Option<&str>, now: DateTime<Utc>) -> Change {
        let Some(session) = self.session.take() else {
            return Change::Ignored;
        };
        let id = session.message_id;
        if let Some(msg) = self.messages.iter_mut().rev().find(|m| m.id() == id) {
            msg.fail(notice, now);
        }
        self.state = ChatState::Failed;
        Change::Failed(id)
    }
}

fn apply_segments(msg: &mut Message, segments: Vec<Segment>) {
    for segment in segments {
        match segment {
            Segment::Visible(text) => msg.push_visible(&text),
            Segment::Reasoning(text) => msg.push_reasoning(&text),
            Segment::ReasoningOpened => msg.open_reasoning(),
            Segment::ReasoningClosed => msg.close_reasoning(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn started() -> (Conversation, MessageId) {
        let mut conv = Conversation::default();
        conv.submit("What is the leave policy?", None, t(0)).unwrap();
        let id = conv.active_message_id().unwrap();
        (conv, id)
    }

    fn answer(conv: &Conversation, id: MessageId) -> &Message {
        conv.message(id).unwrap()
    }

    #[test]
    fn submit_creates_user_and_streaming_assistant() {
        let (conv, id) = started();
        assert_eq!(conv.state(), ChatState::Streaming);
        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].role(), Role::User);
        assert!(answer(&conv, id).is_streaming());
        assert!(conv.messages()[0].id() < id);
    }

    #[test]
    fn submit_rejects_blank_input() {
        let mut conv = Conversation::default();
        assert_eq!(conv.submit("   \n", None, t(0)), Err(SubmitError::Blank));
        assert_eq!(conv.state(), ChatState::Idle);
        assert!(conv.messages().is_empty());
    }

    #[test]
    fn submit_while_streaming_is_busy() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("partial"), t(5));
        let before = answer(&conv, id).clone();

        assert_eq!(conv.submit("another", None, t(6)), Err(SubmitError::Busy));
        assert_eq!(answer(&conv, id), &before);
        assert_eq!(conv.messages().len(), 2);
    }

    #[test]
    fn blank_category_filter_is_dropped() {
        let mut conv = Conversation::default();
        let req = conv.submit("q", Some("  ".into()), t(0)).unwrap();
        assert!(req.main_category_filter.is_none());
    }

    #[test]
    fn done_finalizes_and_appends_history() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("Fifteen days."), t(10));
        let change = conv.apply(id, Frame::Done, t(1_500));

        assert_eq!(change, Change::Finalized(id));
        assert_eq!(conv.state(), ChatState::Finalized);
        let msg = answer(&conv, id);
        assert!(!msg.is_streaming());
        assert_eq!(msg.completed_at(), Some(t(1_500)));

        let history = conv.history().entries();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "What is the leave policy?");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Fifteen days.");
    }

    #[test]
    fn blank_answer_is_not_recorded() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::thinking("hmm"), t(1));
        conv.apply(id, Frame::content("  "), t(2));
        conv.apply(id, Frame::StreamEnd, t(3));
        assert_eq!(conv.state(), ChatState::Finalized);
        assert!(conv.history().is_empty());
    }

    #[test]
    fn next_request_carries_history() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("A."), t(1));
        conv.apply(id, Frame::Done, t(2));
        let req = conv.submit("follow-up", None, t(3)).unwrap();
        assert_eq!(req.conversation_history.len(), 2);
        assert_eq!(req.query, "follow-up");
    }

    #[test]
    fn frames_after_done_are_ignored() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("A"), t(1));
        conv.apply(id, Frame::Done, t(2));
        assert_eq!(conv.apply(id, Frame::content("late"), t(3)), Change::Ignored);
        assert_eq!(conv.apply(id, Frame::Done, t(4)), Change::Ignored);
        assert_eq!(answer(&conv, id).visible_text(), "A");
        assert_eq!(answer(&conv, id).completed_at(), Some(t(2)));
    }

    #[test]
    fn thinking_frames_bypass_delimiters() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::thinking("plan "), t(1));
        conv.apply(id, Frame::content("<think>inline</think>answer"), t(2));
        conv.apply(id, Frame::thinking("more"), t(3));
        let msg = answer(&conv, id);
        assert_eq!(msg.reasoning_text(), "plan inlinemore");
        assert_eq!(msg.visible_text(), "answer");
    }

    #[test]
    fn pending_tail_is_flushed_on_finalize() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("see <thi"), t(1));
        assert_eq!(answer(&conv, id).visible_text(), "see ");
        conv.finish_stream(id, t(2));
        assert_eq!(answer(&conv, id).visible_text(), "see <thi");
        assert_eq!(conv.state(), ChatState::Finalized);
    }

    #[test]
    fn latest_context_frame_wins() {
        let (mut conv, id) = started();
        let doc = |q: &str| ContextRef {
            question: q.into(),
            answer: String::new(),
            category: "hr".into(),
            sub_category: None,
            relevance_score: 0.5,
        };
        conv.apply(id, Frame::context(vec![doc("a"), doc("b"), doc("c")]), t(1));
        conv.apply(id, Frame::context(vec![doc("d")]), t(2));
        conv.apply(id, Frame::content("ok"), t(3));
        conv.apply(id, Frame::Done, t(4));

        let msg = answer(&conv, id);
        assert_eq!(msg.retrieved_context().len(), 1);
        assert_eq!(msg.context_count(), 1);
        assert_eq!(conv.history().entries()[1].context[0].question, "d");
    }

    #[test]
    fn transport_error_replaces_text() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("half an ans"), t(1));
        let change = conv.fail(id, &TransportError::Read("reset".into()), t(2));
        assert_eq!(change, Change::Failed(id));
        assert_eq!(conv.state(), ChatState::Failed);
        let msg = answer(&conv, id);
        assert_eq!(msg.visible_text(), CONNECTION_FAILED_NOTICE);
        assert!(msg.is_failed());
        assert_eq!(msg.completed_at(), Some(t(2)));
        assert!(conv.history().is_empty());
    }

    #[test]
    fn cancel_keeps_partial_text() {
        let (mut conv, id) = started();
        conv.apply(id, Frame::content("half"), t(1));
        assert_eq!(conv.cancel(t(2)), Change::Failed(id));
        assert_eq!(answer(&conv, id).visible_text(), "half");
        assert!(conv.history().is_empty());
        assert_eq!(conv.apply(id, Frame::content("more"), t(3)), Change::Ignored);
        assert_eq!(conv.cancel(t(4)), Change::Ignored);
    }

    #[test]
    fn failed_state_accepts_new_submission() {
        let (mut conv, id) = started();
        conv.fail(id, &TransportError::Connect("refused".into()), t(1));
        assert!(conv.submit("retry", None, t(2)).is_ok());
        assert_eq!(conv.state(), ChatState::Streaming);
    }

    #[test]
    fn stale_session_events_are_ignored() {
        let (mut conv, old) = started();
        conv.cancel(t(1));
        conv.submit("second", None, t(2)).unwrap();
        let new = conv.active_message_id().unwrap();
        assert_ne!(old, new);

        assert_eq!(conv.apply(old, Frame::content("stale"), t(3)), Change::Ignored);
        assert_eq!(conv.fail(old, &TransportError::Cancelled, t(3)), Change::Ignored);
        assert_eq!(conv.finish_stream(old, t(3)), Change::Ignored);
        assert!(conv.is_streaming());
    }

    #[test]
    fn empty_deltas_do_not_notify() {
        let (mut conv, id) = started();
        assert_eq!(conv.apply(id, Frame::Content { content: None }, t(1)), Change::Ignored);
        assert_eq!(conv.apply(id, Frame::thinking(""), t(1)), Change::Ignored);
    }

    #[test]
    fn only_terminal_changes_end_the_session() {
        let (mut conv, id) = started();
        let updated = conv.apply(id, Frame::content("a"), t(1));
        assert!(updated.is_mutation());
        assert!(!updated.ends_session());
        assert!(!Change::Ignored.ends_session());
        assert!(conv.apply(id, Frame::Done, t(2)).ends_session());

        conv.submit("again", None, t(3)).unwrap();
        let id = conv.active_message_id().unwrap();
        assert!(conv.cancel(t(4)).ends_session());
        assert!(!conv.finish_stream(id, t(5)).ends_session());
    }
}
