//! Incremental separation of inline reasoning from answer text.
//!
//! The upstream service may wrap its deliberation in a pair of delimiter
//! tokens inside ordinary `content` deltas. Network chunking routinely cuts a
//! token in two, so the splitter never decides on a trailing run of text that
//! could still turn into a token: that run is held back and re-scanned
//! together with the next delta.

use serde::{Deserialize, Serialize};

/// The literal open/close tokens agreed with the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    /// Token that opens a reasoning segment.
    pub open: String,
    /// Token that closes a reasoning segment.
    pub close: String,
}

impl Delimiters {
    /// Create a delimiter pair.
    #[must_use]
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Length in bytes of the longest token.
    #[must_use]
    pub fn longest(&self) -> usize {
        self.open.len().max(self.close.len())
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new("<think>", "</think>")
    }
}

/// A piece of a delta, routed to one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Answer text.
    Visible(String),
    /// Reasoning text.
    Reasoning(String),
    /// A reasoning segment was opened.
    ReasoningOpened,
    /// A reasoning segment was closed.
    ReasoningClosed,
}

/// Splitter state for one stream.
#[derive(Debug, Clone)]
pub struct ThinkingSplitter {
    delimiters: Delimiters,
    reasoning_open: bool,
    pending: String,
}

impl ThinkingSplitter {
    /// Create a splitter for the given tokens.
    ///
    /// Empty tokens are never matched.
    #[must_use]
    pub fn new(delimiters: Delimiters) -> Self {
        Self {
            delimiters,
            reasoning_open: false,
            pending: String::new(),
        }
    }

    /// Whether a reasoning segment is currently open.
    #[must_use]
    pub const fn reasoning_open(&self) -> bool {
        self.reasoning_open
    }

    /// Text held back because it may be the start of a token.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// The tokens this splitter looks for.
    #[must_use]
    pub const fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Consume one delta and return the routed segments in order.
    pub fn push(&mut self, delta: &str) -> Vec<Segment> {
        let mut text = std::mem::take(&mut self.pending);
        text.push_str(delta);

        let mut segments = Vec::new();
        let mut rest = text.as_str();

        loop {
            let token = self.active_token();
            match find_token(rest, token) {
                Some(at) => {
                    let end = at + token.len();
                    self.emit(&mut segments, &rest[..at]);
                    if self.reasoning_open {
                        self.reasoning_open = false;
                        segments.push(Segment::ReasoningClosed);
                    } else {
                        self.reasoning_open = true;
                        segments.push(Segment::ReasoningOpened);
                    }
                    rest = &rest[end..];
                }
                None => {
                    let held = self.held_suffix_len(rest);
                    let (emit, hold) = rest.split_at(rest.len() - held);
                    self.emit(&mut segments, emit);
                    self.pending = hold.to_string();
                    break;
                }
            }
        }

        segments
    }

    /// Flush held-back text at end of stream.
    ///
    /// With no more data coming the held text cannot complete a token, so it
    /// goes verbatim to whichever bucket is active.
    pub fn finish(&mut self) -> Vec<Segment> {
        let pending = std::mem::take(&mut self.pending);
        let mut segments = Vec::new();
        self.emit(&mut segments, &pending);
        segments
    }

    fn active_token(&self) -> &str {
        if self.reasoning_open {
            &self.delimiters.close
        } else {
            &self.delimiters.open
        }
    }

    fn emit(&self, segments: &mut Vec<Segment>, text: &str) {
        if text.is_empty() {
            return;
        }
        let text = text.to_string();
        segments.push(if self.reasoning_open {
            Segment::Reasoning(text)
        } else {
            Segment::Visible(text)
        });
    }

    /// Length of the longest suffix of `text` that is a proper prefix of
    /// either token. Always lands on a char boundary.
    fn held_suffix_len(&self, text: &str) -> usize {
        let max = self.delimiters.longest().saturating_sub(1).min(text.len());
        (1..=max)
            .rev()
            .find(|&len| {
                let start = text.len() - len;
                if !text.is_char_boundary(start) {
                    return false;
                }
                let tail = &text[start..];
                is_proper_prefix(tail, &self.delimiters.open)
                    || is_proper_prefix(tail, &self.delimiters.close)
            })
            .unwrap_or(0)
    }
}

fn find_token(haystack: &str, token: &str) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    haystack.find(token)
}

fn is_proper_prefix(candidate: &str, token: &str) -> bool {
    candidate.len() < token.len() && token.starts_with(candidate)
}
