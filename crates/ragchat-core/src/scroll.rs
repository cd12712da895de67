//! Scroll-follow policy.
//!
//! [`ScrollFollow`] decides, after every content update, whether the view
//! should jump to the newest content. It never moves the view while the user
//! is scrolling by hand, and it rate-limits jumps while a response streams.
//! The controller is pure: callers pass the current [`Viewport`] and clock,
//! and apply the returned [`ScrollCommand`] themselves.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Scroll position of the chat view, in rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Rows scrolled from the top.
    pub offset: usize,
    /// Largest valid offset (content height minus view height).
    pub max_offset: usize,
}

impl Viewport {
    /// Create a viewport.
    #[must_use]
    pub const fn new(offset: usize, max_offset: usize) -> Self {
        Self { offset, max_offset }
    }

    /// A viewport resting at the bottom.
    #[must_use]
    pub const fn at_bottom(max_offset: usize) -> Self {
        Self::new(max_offset, max_offset)
    }

    /// Rows between the current position and the bottom.
    #[must_use]
    pub const fn distance_to_bottom(self) -> usize {
        self.max_offset.saturating_sub(self.offset)
    }
}

/// How to move to the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Jump immediately.
    Instant,
    /// Animate the move.
    Smooth,
}

/// Timings and thresholds for [`ScrollFollow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPolicy {
    /// Rows from the bottom that still count as "at the bottom".
    #[serde(default = "ScrollPolicy::default_proximity_rows")]
    pub proximity_rows: usize,
    /// Quiet period after a manual scroll, in milliseconds.
    #[serde(default = "ScrollPolicy::default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Minimum gap between automatic scrolls while streaming, in milliseconds.
    #[serde(default = "ScrollPolicy::default_throttle_ms")]
    pub throttle_ms: u64,
}

impl ScrollPolicy {
    const fn default_proximity_rows() -> usize {
        3
    }

    const fn default_cooldown_ms() -> u64 {
        300
    }

    const fn default_throttle_ms() -> u64 {
        100
    }

    /// Manual-scroll cooldown.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Streaming throttle interval.
    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            proximity_rows: Self::default_proximity_rows(),
            cooldown_ms: Self::default_cooldown_ms(),
            throttle_ms: Self::default_throttle_ms(),
        }
    }
}

/// The user's scroll intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollIntent {
    /// Whether new content should pull the view down.
    pub follow_enabled: bool,
    /// End of the manual-scroll cooldown, if one is running.
    pub scrolling_until: Option<Instant>,
}

impl ScrollIntent {
    /// Whether the user scrolled by hand within the cooldown window.
    #[must_use]
    pub fn user_is_scrolling(&self, now: Instant) -> bool {
        self.scrolling_until.is_some_and(|until| now < until)
    }
}

impl Default for ScrollIntent {
    fn default() -> Self {
        Self {
            follow_enabled: true,
            scrolling_until: None,
        }
    }
}

/// Scroll-follow controller.
#[derive(Debug, Clone, Default)]
pub struct ScrollFollow {
    policy: ScrollPolicy,
    intent: ScrollIntent,
    last_auto: Option<Instant>,
    pending: bool,
}

impl ScrollFollow {
    /// Create a controller with follow enabled.
    #[must_use]
    pub fn new(policy: ScrollPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Current intent.
    #[must_use]
    pub const fn intent(&self) -> ScrollIntent {
        self.intent
    }

    /// Whether follow is on.
    #[must_use]
    pub const fn follow_enabled(&self) -> bool {
        self.intent.follow_enabled
    }

    /// Whether a throttled or deferred scroll is waiting for [`Self::tick`].
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending
    }

    /// Active thresholds.
    #[must_use]
    pub const fn policy(&self) -> &ScrollPolicy {
        &self.policy
    }

    /// Whether `viewport` is within the proximity threshold of the bottom.
    #[must_use]
    pub const fn is_near_bottom(&self, viewport: Viewport) -> bool {
        viewport.distance_to_bottom() <= self.policy.proximity_rows
    }

    /// React to a content mutation.
    pub fn on_content_updated(
        &mut self,
        viewport: Viewport,
        streaming: bool,
        now: Instant,
    ) -> Option<ScrollCommand> {
        if self.intent.user_is_scrolling(now) {
            // Re-evaluated when the cooldown ends.
            self.pending = true;
            return None;
        }
        if !self.wants_follow(viewport, streaming) {
            return None;
        }

        if streaming {
            if self.throttled(now) {
                self.pending = true;
                return None;
            }
            self.last_auto = Some(now);
            self.pending = false;
            Some(ScrollCommand::Instant)
        } else {
            self.pending = false;
            Some(ScrollCommand::Smooth)
        }
    }

    /// Advance the clock: end an expired cooldown and deliver a scroll that
    /// was held back by the throttle or the cooldown.
    pub fn tick(
        &mut self,
        viewport: Viewport,
        streaming: bool,
        now: Instant,
    ) -> Option<ScrollCommand> {
        if let Some(until) = self.intent.scrolling_until {
            if now < until {
                return None;
            }
            self.intent.scrolling_until = None;
            self.intent.follow_enabled = self.is_near_bottom(viewport);
            tracing::trace!(follow = self.intent.follow_enabled, "Manual scroll cooldown ended");
        }

        if !self.pending {
            return None;
        }
        if !self.wants_follow(viewport, streaming) {
            self.pending = false;
            return None;
        }
        if streaming {
            if self.throttled(now) {
                return None;
            }
            self.last_auto = Some(now);
            self.pending = false;
            Some(ScrollCommand::Instant)
        } else {
            self.pending = false;
            Some(ScrollCommand::Smooth)
        }
    }

    /// The user moved the view by hand to `viewport`.
    ///
    /// Leaving the threshold turns follow off; landing inside it turns follow
    /// back on. Either way, no automatic scroll happens until the cooldown
    /// has passed.
    pub fn on_manual_scroll(&mut self, viewport: Viewport, now: Instant) {
        self.intent.scrolling_until = Some(now + self.policy.cooldown());
        self.intent.follow_enabled = self.is_near_bottom(viewport);
        self.pending = false;
    }

    /// Explicit request to go to the bottom. Always scrolls and re-enables
    /// follow.
    pub fn scroll_to_bottom_now(&mut self, now: Instant) -> ScrollCommand {
        self.intent = ScrollIntent::default();
        self.pending = false;
        self.last_auto = Some(now);
        ScrollCommand::Instant
    }

    /// A response started streaming. Near the bottom this turns follow on
    /// and ends any cooldown.
    pub fn on_stream_started(&mut self, viewport: Viewport) {
        if self.is_near_bottom(viewport) {
            self.intent = ScrollIntent::default();
        }
    }

    fn wants_follow(&self, viewport: Viewport, streaming: bool) -> bool {
        self.intent.follow_enabled && (streaming || self.is_near_bottom(viewport))
    }

    fn throttled(&self, now: Instant) -> bool {
        self.last_auto
            .is_some_and(|last| now.saturating_duration_since(last) < self.policy.throttle())
    }
}

/// Ease-out animation of a scroll offset toward a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollAnimation {
    from: usize,
    to: usize,
    started: Instant,
    duration: Duration,
}

impl ScrollAnimation {
    /// Animate from `from` to `to` over `duration`.
    #[must_use]
    pub const fn new(from: usize, to: usize, started: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started,
            duration,
        }
    }

    /// Target offset.
    #[must_use]
    pub const fn target(&self) -> usize {
        self.to
    }

    /// Whether the animation has reached its target at `now`.
    #[must_use]
    pub fn is_finished(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.duration
    }

    /// Offset at `now`, using a cubic ease-out.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn offset_at(&self, now: Instant) -> usize {
        if self.is_finished(now) || self.duration.is_zero() {
            return self.to;
        }
        let t = now.saturating_duration_since(self.started).as_secs_f64()
            / self.duration.as_secs_f64();
        let eased = 1.0 - (1.0 - t).powi(3);
        let from = self.from as f64;
        let to = self.to as f64;
        (from + (to - from) * eased).round().max(0.0) as usize
    }
}
