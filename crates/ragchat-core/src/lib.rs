//! Streaming-response core for the ragchat assistant client.
//!
//! This crate turns an incremental event stream from the assistant service
//! into chat messages:
//!
//! - **Frame decoding**: newline-delimited `data:` lines into typed [`Frame`]s
//! - **Reasoning split**: inline delimiters separated from answer text, even
//!   when a delimiter is cut across chunks
//! - **Message state machine**: one [`Conversation`] owning messages, the
//!   active session, and the history sent with the next request
//! - **Scroll follow**: when to pull the view to the newest content
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use ragchat_core::{Conversation, FrameDecoder};
//!
//! let mut conversation = Conversation::default();
//! conversation.submit("How many vacation days?", None, Utc::now()).unwrap();
//! let id = conversation.active_message_id().unwrap();
//!
//! let mut decoder = FrameDecoder::new();
//! let body = b"data: {\"type\":\"content\",\"content\":\"<think>check</think>Fifteen.\"}\n\
//!              data: {\"type\":\"done\"}\n";
//! for frame in decoder.push(body) {
//!     conversation.apply(id, frame, Utc::now());
//! }
//!
//! let answer = conversation.message(id).unwrap();
//! assert_eq!(answer.visible_text(), "Fifteen.");
//! assert_eq!(answer.reasoning_text(), "check");
//! assert_eq!(conversation.history().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod decoder;
pub mod demo;
pub mod error;
pub mod frame;
pub mod history;
pub mod ids;
pub mod message;
pub mod scroll;
pub mod session;
pub mod splitter;
pub mod transport;

pub use config::ChatConfig;
pub use decoder::{decode_frames, decode_line, FrameDecoder};
pub use demo::{DemoPacing, DemoReply};
pub use error::{ConfigError, DecodeError, SubmitError, TransportError};
pub use frame::{ContextRef, Frame};
pub use history::{ConversationHistory, HistoryEntry};
pub use ids::{IdAllocator, MessageId};
pub use message::{Message, Role};
pub use scroll::{ScrollAnimation, ScrollCommand, ScrollFollow, ScrollIntent, ScrollPolicy, Viewport};
pub use session::{ChatState, Change, Conversation, CONNECTION_FAILED_NOTICE};
pub use splitter::{Delimiters, Segment, ThinkingSplitter};
pub use transport::{ByteStream, ChatRequest, ChatTransport, CHAT_STREAM_PATH};
