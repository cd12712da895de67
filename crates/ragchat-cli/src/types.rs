//! Response types for the assistant service's plain JSON endpoints.
//!
//! The chat stream itself is typed in `ragchat_core::Frame`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Health
// =============================================================================

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status string.
    pub status: String,
    /// Whether the retrieval index is loaded.
    #[serde(default)]
    pub rag_ready: bool,
    /// Number of indexed regulation documents.
    #[serde(default, alias = "rules_count")]
    pub regulations_count: u64,
}

/// Service health as shown in the header bar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceHealth {
    /// No probe has completed yet.
    #[default]
    Unknown,
    /// Service up and retrieval index loaded.
    Ready {
        /// Indexed document count.
        documents: u64,
    },
    /// Service answered but is not ready to retrieve.
    Degraded {
        /// Status string reported by the service.
        status: String,
    },
    /// The probe failed.
    Unreachable,
}

impl ServiceHealth {
    /// Short label for the header bar.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Unknown => "checking".to_string(),
            Self::Ready { documents } => format!("ready · {documents} docs"),
            Self::Degraded { status } => status.clone(),
            Self::Unreachable => "unreachable".to_string(),
        }
    }

    /// Color for displaying in the TUI.
    #[must_use]
    pub const fn color(&self) -> ratatui::style::Color {
        use ratatui::style::Color;
        match self {
            Self::Unknown => Color::Gray,
            Self::Ready { .. } => Color::Green,
            Self::Degraded { .. } => Color::Yellow,
            Self::Unreachable => Color::Red,
        }
    }
}

impl From<&HealthResponse> for ServiceHealth {
    fn from(resp: &HealthResponse) -> Self {
        if resp.rag_ready {
            Self::Ready {
                documents: resp.regulations_count,
            }
        } else {
            Self::Degraded {
                status: resp.status.clone(),
            }
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Error body returned by the service for failed requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error message.
    #[serde(alias = "detail")]
    pub error: String,
}
