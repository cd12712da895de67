//! Background producers for chat sessions.
//!
//! Each session runs in its own task that reads the response body, decodes
//! it and forwards frames to the event loop. Every event carries the ID of
//! the assistant message it belongs to, so events from an aborted session
//! can be recognized and dropped.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ragchat_core::{
    decode_frames, ChatRequest, ChatTransport, DemoReply, Frame, MessageId, TransportError,
};

/// Events from a session task.
#[derive(Debug)]
pub enum StreamEvent {
    /// A decoded frame.
    Frame {
        /// Target message.
        id: MessageId,
        /// The frame.
        frame: Frame,
    },
    /// The body ended without a terminal frame.
    Ended {
        /// Target message.
        id: MessageId,
    },
    /// The transport failed.
    Failed {
        /// Target message.
        id: MessageId,
        /// What went wrong.
        error: TransportError,
    },
    /// The stream could not be opened; an offline demo reply follows.
    Fallback {
        /// Target message.
        id: MessageId,
        /// Why the stream could not be opened.
        error: TransportError,
    },
}

impl StreamEvent {
    /// Message the event belongs to.
    #[must_use]
    pub const fn message_id(&self) -> MessageId {
        match self {
            Self::Frame { id, .. }
            | Self::Ended { id }
            | Self::Failed { id, .. }
            | Self::Fallback { id, .. } => *id,
        }
    }
}

/// Spawn the task for one session.
///
/// When `demo` is given and the stream cannot be opened, the demo reply is
/// played into the same channel instead of reporting the failure.
pub fn spawn_session(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    id: MessageId,
    demo: Option<DemoReply>,
    tx: mpsc::Sender<StreamEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match transport.open_stream(&request).await {
            Ok(body) => forward_frames(body, id, &tx).await,
            Err(error) => match demo {
                Some(reply) => {
                    tracing::warn!(message_id = %id, error = %error, "Stream unavailable, playing demo reply");
                    if tx.send(StreamEvent::Fallback { id, error }).await.is_ok() {
                        play_demo(reply, id, &tx).await;
                    }
                }
                None => {
                    let _ = tx.send(StreamEvent::Failed { id, error }).await;
                }
            },
        }
    })
}

/// Decode `body` and forward its frames until a terminal frame, an error,
/// or the end of the body.
async fn forward_frames(body: ragchat_core::ByteStream, id: MessageId, tx: &mpsc::Sender<StreamEvent>) {
    let mut frames = decode_frames(body);
    let mut count = 0usize;

    while let Some(item) = frames.next().await {
        match item {
            Ok(frame) => {
                count += 1;
                let terminal = frame.is_terminal();
                if tx.send(StreamEvent::Frame { id, frame }).await.is_err() {
                    return;
                }
                if terminal {
                    tracing::debug!(message_id = %id, frames = count, "Stream complete");
                    return;
                }
            }
            Err(error) => {
                let _ = tx.send(StreamEvent::Failed { id, error }).await;
                return;
            }
        }
    }

    let _ = tx.send(StreamEvent::Ended { id }).await;
}

/// Deliver the demo reply with its pacing.
async fn play_demo(reply: DemoReply, id: MessageId, tx: &mpsc::Sender<StreamEvent>) {
    for (delay, frame) in reply {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if tx.send(StreamEvent::Frame { id, frame }).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use ragchat_core::{ByteStream, Delimiters, DemoPacing};

    /// Serves a fixed body, or fails to open.
    struct FixedTransport {
        body: Option<Vec<Result<Bytes, TransportError>>>,
    }

    #[async_trait]
    impl ChatTransport for FixedTransport {
        async fn open_stream(&self, _request: &ChatRequest) -> Result<ByteStream, TransportError> {
            match &self.body {
                Some(chunks) => Ok(stream::iter(chunks.clone()).boxed()),
                None => Err(TransportError::Connect("refused".into())),
            }
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            query: "q".into(),
            main_category_filter: None,
            conversation_history: Vec::new(),
            reranker_type: None,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn forwards_frames_and_stops_at_done() {
        let body = "data: {\"type\":\"content\",\"content\":\"a\"}\ndata: {\"type\":\"done\"}\ndata: {\"type\":\"content\",\"content\":\"b\"}\n";
        let transport = Arc::new(FixedTransport {
            body: Some(vec![Ok(Bytes::from_static(body.as_bytes()))]),
        });
        let (tx, rx) = mpsc::channel(16);
        let id = MessageId::from_raw(2);
        let task = spawn_session(transport, request(), id, None, tx);

        let events = drain(rx).await;
        task.await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], StreamEvent::Frame { frame: Frame::Done, .. }));
        assert!(events.iter().all(|e| e.message_id() == id));
    }

    #[tokio::test]
    async fn body_without_done_reports_ended() {
        let transport = Arc::new(FixedTransport {
            body: Some(vec![Ok(Bytes::from_static(
                b"data: {\"type\":\"content\",\"content\":\"a\"}\n",
            ))]),
        });
        let (tx, rx) = mpsc::channel(16);
        let task = spawn_session(transport, request(), MessageId::from_raw(2), None, tx);
        let events = drain(rx).await;
        task.await.unwrap();
        assert!(matches!(events.last(), Some(StreamEvent::Ended { .. })));
    }

    #[tokio::test]
    async fn open_failure_without_demo_reports_failed() {
        let transport = Arc::new(FixedTransport { body: None });
        let (tx, rx) = mpsc::channel(16);
        let task = spawn_session(transport, request(), MessageId::from_raw(2), None, tx);
        let events = drain(rx).await;
        task.await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Failed { error: TransportError::Connect(_), .. }
        ));
    }

    #[tokio::test]
    async fn open_failure_with_demo_plays_reply() {
        let transport = Arc::new(FixedTransport { body: None });
        let demo = DemoReply::new("q", &Delimiters::default(), DemoPacing::immediate());
        let expected_frames = demo.len();
        let (tx, rx) = mpsc::channel(64);
        let task = spawn_session(transport, request(), MessageId::from_raw(2), Some(demo), tx);

        let events = drain(rx).await;
        task.await.unwrap();
        assert!(matches!(&events[0], StreamEvent::Fallback { .. }));
        assert_eq!(events.len(), expected_frames + 1);
        assert!(matches!(events.last(), Some(StreamEvent::Frame { frame: Frame::Done, .. })));
    }
}
