//! Seam between the state machine and the network.
//!
//! The core never talks HTTP itself. A [`ChatTransport`] turns a
//! [`ChatRequest`] into a stream of raw body chunks, which
//! [`crate::decode_frames`] turns into frames.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::history::HistoryEntry;

/// Path of the streaming chat endpoint, relative to the server URL.
pub const CHAT_STREAM_PATH: &str = "/api/chat_stream";

/// Raw response body, chunked arbitrarily.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Body of the outbound chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub query: String,
    /// Restrict retrieval to one top-level category.
    pub main_category_filter: Option<String>,
    /// Turns finalized before this request, oldest first.
    pub conversation_history: Vec<HistoryEntry>,
    /// Reranker the service should apply to retrieved documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker_type: Option<String>,
}

/// Opens event streams for chat requests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `request` and return the response body as a chunk stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the server cannot be reached and
    /// [`TransportError::Status`] for a non-success response.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_null_filter() {
        let req = ChatRequest {
            query: "leave policy".into(),
            main_category_filter: None,
            conversation_history: Vec::new(),
            reranker_type: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["query"], "leave policy");
        assert!(value["main_category_filter"].is_null());
        assert_eq!(value["conversation_history"], serde_json::json!([]));
        assert!(value.get("reranker_type").is_none());
    }

    #[test]
    fn request_carries_reranker_when_set() {
        let req = ChatRequest {
            query: "q".into(),
            main_category_filter: None,
            conversation_history: Vec::new(),
            reranker_type: Some("qwen3".into()),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["reranker_type"], "qwen3");
    }
}
