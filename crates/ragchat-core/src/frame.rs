//! Typed frames carried by the assistant event stream.
//!
//! Each `data:` line of the response body decodes into one [`Frame`],
//! discriminated by its `type` field.

use serde::{Deserialize, Serialize};

/// A supporting document the assistant retrieved for its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRef {
    /// Question the document answers.
    pub question: String,
    /// Document body.
    #[serde(default)]
    pub answer: String,
    /// Top-level category.
    #[serde(rename = "main_category", alias = "category", default)]
    pub category: String,
    /// Sub-category, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    /// Relevance in `0.0..=1.0`.
    #[serde(rename = "score", alias = "relevance_score", default)]
    pub relevance_score: f64,
}

impl ContextRef {
    /// Relevance as a percentage with one decimal, e.g. `"87.5%"`.
    #[must_use]
    pub fn relevance_percent(&self) -> String {
        format!("{:.1}%", self.relevance_score * 100.0)
    }
}

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Reasoning text delta on the dedicated channel.
    Thinking {
        /// Text fragment to append to the reasoning.
        #[serde(default)]
        content: Option<String>,
    },
    /// Answer text delta; may carry inline reasoning delimiters.
    Content {
        /// Text fragment.
        #[serde(default)]
        content: Option<String>,
    },
    /// Retrieved supporting documents. Supersedes earlier context frames.
    Context {
        /// References, most relevant first.
        #[serde(default)]
        context: Option<Vec<ContextRef>>,
        /// Number of references the server reports.
        #[serde(default)]
        context_count: Option<u32>,
    },
    /// Terminal frame.
    Done,
    /// Terminal frame (alternate spelling used by some servers).
    StreamEnd,
}

impl Frame {
    /// Build a `content` frame.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: Some(text.into()),
        }
    }

    /// Build a `thinking` frame.
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking {
            content: Some(text.into()),
        }
    }

    /// Build a `context` frame whose count matches the list length.
    #[must_use]
    pub fn context(refs: Vec<ContextRef>) -> Self {
        let count = u32::try_from(refs.len()).unwrap_or(u32::MAX);
        Self::Context {
            context: Some(refs),
            context_count: Some(count),
        }
    }

    /// Whether this frame ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::StreamEnd)
    }

    /// The wire name of the frame type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::Content { .. } => "content",
            Self::Context { .. } => "context",
            Self::Done => "done",
            Self::StreamEnd => "stream_end",
        }
    }
}
