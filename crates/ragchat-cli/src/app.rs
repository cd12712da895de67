//! Application state.
//!
//! Owns the conversation, the input line and the chat viewport, and turns
//! session events and key presses into state changes. Rendering lives in
//! `ui`; the event loop lives in `main`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ragchat_core::{
    Change, ChatConfig, ChatTransport, Conversation, DemoReply, ScrollAnimation, ScrollCommand,
    ScrollFollow, SubmitError, Viewport,
};

use crate::stream::{self, StreamEvent};
use crate::types::ServiceHealth;

/// Duration of a smooth scroll to the bottom.
const SMOOTH_SCROLL: Duration = Duration::from_millis(150);

/// Size of the rendered chat column, reported back by `ui::render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChatMetrics {
    /// Wrapped lines of chat content.
    pub total_lines: usize,
    /// Lines that fit in the chat area.
    pub visible_lines: usize,
}

impl ChatMetrics {
    /// Largest valid scroll offset.
    #[must_use]
    pub const fn max_offset(self) -> usize {
        self.total_lines.saturating_sub(self.visible_lines)
    }
}

/// Application state.
pub struct App {
    transport: Arc<dyn ChatTransport>,
    config: ChatConfig,
    /// Messages, state machine and history.
    pub conversation: Conversation,
    scroll: ScrollFollow,
    events_tx: mpsc::Sender<StreamEvent>,
    stream_task: Option<JoinHandle<()>>,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in chars.
    pub cursor_position: usize,
    /// First visible chat line.
    pub chat_offset: usize,
    metrics: ChatMetrics,
    animation: Option<ScrollAnimation>,
    content_dirty: bool,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Latest health probe result.
    pub health: ServiceHealth,
    /// Expand reasoning blocks.
    pub show_reasoning: bool,
    /// Show answers of retrieved sources.
    pub show_context: bool,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for loading indicators.
    pub animation_frame: usize,
}

impl App {
    /// Create a new application. Session events are sent to `events_tx`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        config: ChatConfig,
        events_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            transport,
            conversation: Conversation::new(config.delimiters.clone()),
            scroll: ScrollFollow::new(config.scroll),
            config,
            events_tx,
            stream_task: None,
            input: String::new(),
            cursor_position: 0,
            chat_offset: 0,
            metrics: ChatMetrics::default(),
            animation: None,
            content_dirty: false,
            status_message: None,
            error_message: None,
            health: ServiceHealth::Unknown,
            show_reasoning: false,
            show_context: false,
            should_quit: false,
            animation_frame: 0,
        }
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for loading animation.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Server URL for display.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }

    /// Active category filter, if any.
    #[must_use]
    pub fn category_filter(&self) -> Option<&str> {
        self.config.category_filter.as_deref()
    }

    /// Whether follow mode is on.
    #[must_use]
    pub const fn is_following(&self) -> bool {
        self.scroll.follow_enabled()
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Record a health probe result.
    pub fn set_health(&mut self, health: ServiceHealth) {
        if health != self.health {
            tracing::info!(health = %health.label(), "Service health changed");
        }
        self.health = health;
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Submit the input line as a question.
    ///
    /// Returns `true` if a session was started.
    pub fn submit_input(&mut self, now: Instant) -> bool {
        let category = self.config.category_filter.clone();
        let mut request = match self.conversation.submit(&self.input, category, Utc::now()) {
            Ok(request) => request,
            Err(SubmitError::Busy) => {
                self.set_error("Still answering the previous question (Esc to cancel)");
                return false;
            }
            Err(SubmitError::Blank) => return false,
        };
        let Some(id) = self.conversation.active_message_id() else {
            return false;
        };
        self.clear_input();
        request.reranker_type.clone_from(&self.config.reranker_type);

        let demo = self.config.demo_fallback.then(|| {
            DemoReply::new(&request.query, &self.config.delimiters, self.config.demo)
        });
        self.stream_task = Some(stream::spawn_session(
            Arc::clone(&self.transport),
            request,
            id,
            demo,
            self.events_tx.clone(),
        ));

        self.scroll.on_stream_started(self.viewport());
        if self.scroll.follow_enabled() {
            let command = self.scroll.scroll_to_bottom_now(now);
            self.apply_scroll(command, now);
        }
        self.content_dirty = true;
        self.set_status("Answering... (Esc to cancel)");
        true
    }

    /// Apply an event from a session task.
    ///
    /// Returns `true` if the UI should be redrawn.
    pub fn handle_stream_event(&mut self, event: StreamEvent) -> bool {
        tracing::trace!(message_id = %event.message_id(), "Stream event");
        let now = Utc::now();
        let change = match event {
            StreamEvent::Frame { id, frame } => self.conversation.apply(id, frame, now),
            StreamEvent::Ended { id } => self.conversation.finish_stream(id, now),
            StreamEvent::Failed { id, error } => {
                let change = self.conversation.fail(id, &error, now);
                if change.is_mutation() {
                    self.set_error(format!("Request failed: {error}"));
                }
                change
            }
            StreamEvent::Fallback { id, error } => {
                if self.conversation.active_message_id() == Some(id) {
                    self.set_status(format!("Server unavailable ({error}), showing demo reply"));
                    return true;
                }
                return false;
            }
        };

        if !change.is_mutation() {
            return false;
        }
        if change.ends_session() {
            self.stream_task = None;
        }
        if let Change::Finalized(id) = change {
            let label = self
                .conversation
                .message(id)
                .and_then(ragchat_core::Message::processing_time_label);
            match label {
                Some(label) => self.set_status(format!("Answered in {label}")),
                None => self.set_status("Answered"),
            }
        }
        self.content_dirty = true;
        true
    }

    /// Cancel the current response, keeping the text received so far.
    ///
    /// Returns `true` if a session was active.
    pub fn cancel_streaming(&mut self) -> bool {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        let change = self.conversation.cancel(Utc::now());
        if change.is_mutation() {
            self.content_dirty = true;
            self.set_status("Cancelled");
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    fn viewport(&self) -> Viewport {
        Viewport::new(self.chat_offset, self.metrics.max_offset())
    }

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize, now: Instant) {
        self.animation = None;
        self.chat_offset = self.chat_offset.saturating_sub(amount);
        self.scroll.on_manual_scroll(self.viewport(), now);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize, now: Instant) {
        self.animation = None;
        self.chat_offset = self
            .chat_offset
            .saturating_add(amount)
            .min(self.metrics.max_offset());
        self.scroll.on_manual_scroll(self.viewport(), now);
    }

    /// Jump to the newest line and resume following.
    pub fn scroll_to_bottom_now(&mut self, now: Instant) {
        let command = self.scroll.scroll_to_bottom_now(now);
        self.apply_scroll(command, now);
    }

    fn apply_scroll(&mut self, command: ScrollCommand, now: Instant) {
        let bottom = self.metrics.max_offset();
        match command {
            ScrollCommand::Instant => {
                self.animation = None;
                self.chat_offset = bottom;
            }
            ScrollCommand::Smooth => {
                if self.chat_offset != bottom {
                    self.animation = Some(ScrollAnimation::new(
                        self.chat_offset,
                        bottom,
                        now,
                        SMOOTH_SCROLL,
                    ));
                }
            }
        }
    }

    /// Feed back the size of the frame just drawn.
    ///
    /// Runs follow decisions against the new layout and advances any smooth
    /// scroll. Returns `true` if the offset moved and the frame should be
    /// drawn again.
    pub fn on_rendered(&mut self, metrics: ChatMetrics, now: Instant) -> bool {
        let before = self.chat_offset;
        self.metrics = metrics;
        let bottom = metrics.max_offset();
        self.chat_offset = self.chat_offset.min(bottom);

        let streaming = self.conversation.is_streaming();
        let mut command = None;
        if std::mem::take(&mut self.content_dirty) {
            command = self.scroll.on_content_updated(self.viewport(), streaming, now);
        }
        if let Some(ticked) = self.scroll.tick(self.viewport(), streaming, now) {
            command = Some(ticked);
        }
        if let Some(command) = command {
            self.apply_scroll(command, now);
        }

        if let Some(animation) = self.animation {
            self.chat_offset = animation.offset_at(now).min(bottom);
            if animation.is_finished(now) {
                self.animation = None;
            }
        }

        self.chat_offset != before
    }

    /// Whether the UI needs high-frequency redraws.
    #[must_use]
    pub const fn needs_immediate_redraw(&self) -> bool {
        self.conversation.is_streaming() || self.animation.is_some() || self.scroll.has_pending()
    }

    /// Whether a smooth scroll is in progress.
    #[must_use]
    pub const fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self, char_index: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_index)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_chars() {
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_chars() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_chars();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Input text before the cursor.
    #[must_use]
    pub fn input_before_cursor(&self) -> &str {
        &self.input[..self.byte_index(self.cursor_position)]
    }
}
