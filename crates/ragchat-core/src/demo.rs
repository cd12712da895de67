//! Offline demo reply.
//!
//! When the service cannot be reached the client may play a canned answer
//! instead. [`DemoReply`] produces the same `content` frames a live server
//! would, one character at a time, with the reasoning wrapped in the inline
//! delimiters, so the reply goes through the regular state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::splitter::Delimiters;

/// Per-character delays for the demo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoPacing {
    /// Delay before each reasoning character, in milliseconds.
    #[serde(default = "DemoPacing::default_reasoning_char_ms")]
    pub reasoning_char_ms: u64,
    /// Pause between the end of reasoning and the answer, in milliseconds.
    #[serde(default = "DemoPacing::default_reasoning_pause_ms")]
    pub reasoning_pause_ms: u64,
    /// Delay before each answer character, in milliseconds.
    #[serde(default = "DemoPacing::default_answer_char_ms")]
    pub answer_char_ms: u64,
}

impl DemoPacing {
    const fn default_reasoning_char_ms() -> u64 {
        20
    }

    const fn default_reasoning_pause_ms() -> u64 {
        500
    }

    const fn default_answer_char_ms() -> u64 {
        30
    }

    /// Pacing with no delays, for tests.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            reasoning_char_ms: 0,
            reasoning_pause_ms: 0,
            answer_char_ms: 0,
        }
    }
}

impl Default for DemoPacing {
    fn default() -> Self {
        Self {
            reasoning_char_ms: Self::default_reasoning_char_ms(),
            reasoning_pause_ms: Self::default_reasoning_pause_ms(),
            answer_char_ms: Self::default_answer_char_ms(),
        }
    }
}

/// A paced, finite sequence of frames that answers `question` offline.
///
/// Each item is the delay to wait before delivering the frame. The sequence
/// ends with [`Frame::Done`]. [`DemoReply::restart`] rewinds it.
#[derive(Debug, Clone)]
pub struct DemoReply {
    chars: Vec<char>,
    answer_start: usize,
    pacing: DemoPacing,
    pos: usize,
}

impl DemoReply {
    /// Build the demo reply to `question`.
    #[must_use]
    pub fn new(question: &str, delimiters: &Delimiters, pacing: DemoPacing) -> Self {
        let mut script = String::new();
        script.push_str(&delimiters.open);
        script.push_str(&reasoning_script(question));
        script.push_str(&delimiters.close);
        let answer_start = script.chars().count();
        script.push_str(&answer_script(question));

        Self {
            chars: script.chars().collect(),
            answer_start,
            pacing,
            pos: 0,
        }
    }

    /// Rewind to the first frame.
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// Number of frames left, including the final `done`.
    #[must_use]
    pub fn remaining(&self) -> usize {
        (self.chars.len() + 1).saturating_sub(self.pos)
    }

    fn delay_for(&self, index: usize) -> Duration {
        let ms = if index < self.answer_start {
            self.pacing.reasoning_char_ms
        } else if index == self.answer_start {
            self.pacing.reasoning_pause_ms
        } else {
            self.pacing.answer_char_ms
        };
        Duration::from_millis(ms)
    }
}

impl Iterator for DemoReply {
    type Item = (Duration, Frame);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.pos;
        if index > self.chars.len() {
            return None;
        }
        self.pos += 1;

        match self.chars.get(index) {
            Some(ch) => Some((self.delay_for(index), Frame::content(ch.to_string()))),
            None => Some((Duration::from_millis(self.pacing.answer_char_ms), Frame::Done)),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for DemoReply {}

fn reasoning_script(question: &str) -> String {
    format!(
        "The user asked about \"{question}\".\n\
         Checking whether this concerns a company regulation.\n\
         Picking the matching category.\n\
         Searching the regulation index for related articles.\n\
         Composing an accurate and helpful answer.\n"
    )
}

fn answer_script(question: &str) -> String {
    format!(
        "Hello! Here is what I can tell you about \"{question}\".\n\n\
         ## Summary\n\n\
         This is an offline demo answer. Once the assistant service is \
         reachable, answers are grounded in the actual regulations.\n\n\
         ### Details\n\n\
         | Item | Value | Note |\n\
         |------|-------|------|\n\
         | Processing time | 1-3 days | Business days |\n\
         | Approver | Team lead or above | Delegation allowed |\n\
         | Documents | Request form, receipts | Submit in advance |\n\n\
         Ask me anytime if you need more detail!"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::{Segment, ThinkingSplitter};

    fn demo() -> DemoReply {
        DemoReply::new("overtime", &Delimiters::default(), DemoPacing::default())
    }

    #[test]
    fn ends_with_single_done_frame() {
        let frames: Vec<_> = demo().map(|(_, f)| f).collect();
        assert_eq!(frames.last(), Some(&Frame::Done));
        assert_eq!(frames.iter().filter(|f| f.is_terminal()).count(), 1);
    }

    #[test]
    fn every_content_frame_is_one_char() {
        for (_, frame) in demo() {
            if let Frame::Content { content: Some(text) } = frame {
                assert_eq!(text.chars().count(), 1);
            }
        }
    }

    #[test]
    fn splitter_separates_reasoning_from_answer() {
        let mut splitter = ThinkingSplitter::new(Delimiters::default());
        let mut visible = String::new();
        let mut reasoning = String::new();
        let mut segments = Vec::new();
        for (_, frame) in demo() {
            if let Frame::Content { content: Some(text) } = frame {
                segments.extend(splitter.push(&text));
            }
        }
        segments.extend(splitter.finish());
        for s in segments {
            match s {
                Segment::Visible(t) => visible.push_str(&t),
                Segment::Reasoning(t) => reasoning.push_str(&t),
                _ => {}
            }
        }
        assert!(reasoning.contains("\"overtime\""));
        assert!(!reasoning.contains("<think>"));
        assert!(visible.starts_with("Hello!"));
        assert!(visible.contains("| Approver |"));
        assert!(!visible.contains("</think>"));
    }

    #[test]
    fn pauses_once_after_reasoning() {
        let delays: Vec<Duration> = demo().map(|(d, _)| d).collect();
        let pauses = delays.iter().filter(|d| **d == Duration::from_millis(500)).count();
        assert_eq!(pauses, 1);
        assert_eq!(delays[0], Duration::from_millis(20));
    }

    #[test]
    fn restart_replays_the_same_frames() {
        let mut reply = demo();
        let first: Vec<_> = reply.by_ref().collect();
        assert_eq!(reply.remaining(), 0);
        reply.restart();
        let second: Vec<_> = reply.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn size_hint_is_exact() {
        let reply = demo();
        let expected = reply.len();
        assert_eq!(reply.count(), expected);
    }
}
