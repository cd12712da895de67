//! HTTP client for the assistant service.
//!
//! Implements [`ChatTransport`] over a streaming `reqwest` response body and
//! exposes the health probe.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;

use ragchat_core::{ByteStream, ChatRequest, ChatTransport, TransportError, CHAT_STREAM_PATH};

use crate::types::{ApiErrorResponse, HealthResponse};

/// Path of the health endpoint.
const HEALTH_PATH: &str = "/api/health";

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Client for the assistant service.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the service (e.g., "http://localhost:8000")
    /// * `connect_timeout` - Limit on establishing each connection
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Read the error body of a failed response.
    async fn error_message(response: reqwest::Response) -> String {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(err) => err.error,
            Err(_) if !text.trim().is_empty() => text,
            Err(_) => "Unknown error".to_string(),
        }
    }

    /// Probe the service.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}{HEALTH_PATH}", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = Self::error_message(response).await;
            return Err(ClientError::Api { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let url = format!("{}{CHAT_STREAM_PATH}", self.base_url);
        tracing::debug!(url = %url, history = request.conversation_history.len(), "Opening chat stream");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = Self::error_message(response).await;
            return Err(TransportError::Status { status, message });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::{decode_frames, Frame};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatClient {
        ChatClient::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    fn request(query: &str) -> ChatRequest {
        ChatRequest {
            query: query.to_string(),
            main_category_filter: Some("hr".to_string()),
            conversation_history: Vec::new(),
            reranker_type: Some("qwen3".to_string()),
        }
    }

    #[tokio::test]
    async fn open_stream_posts_request_and_yields_frames() {
        let server = MockServer::start().await;
        let body = "data: {\"type\":\"context\",\"context\":[],\"context_count\":0}\n\
                    data: {\"type\":\"content\",\"content\":\"Fifteen days.\"}\n\
                    data: {\"type\":\"done\"}\n";
        Mock::given(method("POST"))
            .and(path("/api/chat_stream"))
            .and(body_partial_json(serde_json::json!({
                "query": "vacation",
                "main_category_filter": "hr",
                "reranker_type": "qwen3",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = client(&server).open_stream(&request("vacation")).await.unwrap();
        let frames: Vec<Frame> = decode_frames(bytes)
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], Frame::content("Fifteen days."));
        assert!(frames[2].is_terminal());
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat_stream"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(serde_json::json!({"detail": "index loading"})),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .open_stream(&request("q"))
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                message: "index loading".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_connect_error() {
        // Port 9 (discard) is closed on test machines.
        let client = ChatClient::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        let err = client.open_stream(&request("q")).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn health_parses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "healthy",
                "rag_ready": true,
                "regulations_count": 120,
            })))
            .mount(&server)
            .await;

        let health = client(&server).health().await.unwrap();
        assert!(health.rag_ready);
        assert_eq!(health.regulations_count, 120);
    }

    #[tokio::test]
    async fn health_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        match client(&server).health().await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }
}
