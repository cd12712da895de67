//! Line-oriented frame decoder.
//!
//! The response body is a sequence of newline-terminated lines. Lines that
//! start with `data:` carry one JSON frame each; every other line is ignored.
//! Chunks from the transport may end anywhere, including in the middle of a
//! line or of a multi-byte character, so the decoder keeps the unterminated
//! tail and only parses a line once its newline has arrived.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::error::{DecodeError, TransportError};
use crate::frame::Frame;

/// Prefix marking a line that carries a frame.
pub const DATA_PREFIX: &[u8] = b"data:";

/// Incremental decoder from raw body bytes to [`Frame`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Bytes of `buf` already searched for a newline.
    scanned: usize,
    dropped: usize,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every frame completed by it, in order.
    ///
    /// Malformed lines are logged and skipped; they never stop decoding.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.buf.split_to(pos + 1);
            self.scanned = 0;
            match decode_line(&line[..pos]) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) => {
                    self.dropped += 1;
                    tracing::warn!(
                        error = %e,
                        line = %String::from_utf8_lossy(&line[..pos]),
                        "Dropping malformed stream line"
                    );
                }
            }
        }
        self.scanned = self.buf.len();
        frames
    }

    /// Signal end of input. An unterminated trailing line is discarded.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            tracing::debug!(
                bytes = self.buf.len(),
                "Discarding unterminated trailing line at end of stream"
            );
            self.buf.clear();
        }
        self.scanned = 0;
    }

    /// Number of bytes held back waiting for a newline.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Number of malformed lines dropped so far.
    #[must_use]
    pub fn dropped_lines(&self) -> usize {
        self.dropped
    }
}

/// Decode one complete line (without its `\n`).
///
/// Returns `Ok(None)` for lines that carry no frame: lines without the
/// `data:` prefix and blank payloads.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is not UTF-8 or not a known frame.
pub fn decode_line(line: &[u8]) -> Result<Option<Frame>, DecodeError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    let payload = payload.strip_prefix(b" ").unwrap_or(payload);

    let text = std::str::from_utf8(payload)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(text)?))
}

/// Adapt a stream of body chunks into a lazy stream of frames.
///
/// A transport error is yielded once and ends the stream. When the body ends
/// normally the stream simply ends, whether or not a terminal frame was seen.
pub fn decode_frames<S>(chunks: S) -> BoxStream<'static, Result<Frame, TransportError>>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        decoder.finish();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn content(text: &str) -> Frame {
        Frame::content(text)
    }

    #[test]
    fn decodes_complete_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(
            b"data: {\"type\":\"content\",\"content\":\"a\"}\n\
              data: {\"type\":\"done\"}\n",
        );
        assert_eq!(frames, vec![content("a"), Frame::Done]);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn holds_partial_line_until_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"con").is_empty());
        assert!(decoder.push(b"tent\",\"content\":\"hi\"}").is_empty());
        assert!(decoder.pending_bytes() > 0);
        assert_eq!(decoder.push(b"\n"), vec![content("hi")]);
    }

    #[test]
    fn long_line_in_small_chunks_is_scanned_once() {
        let line = format!(
            "data: {{\"type\":\"content\",\"content\":\"{}\"}}\n",
            "x".repeat(4096)
        );
        let (body, newline) = line.as_bytes().split_at(line.len() - 1);
        let mut decoder = FrameDecoder::new();
        for chunk in body.chunks(3) {
            assert!(decoder.push(chunk).is_empty());
            assert_eq!(decoder.scanned, decoder.pending_bytes());
        }
        let frames = decoder.push(newline);
        assert_eq!(frames, vec![content(&"x".repeat(4096))]);
        assert_eq!(decoder.scanned, 0);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn reassembles_multibyte_char_split_across_chunks() {
        let line = "data: {\"type\":\"content\",\"content\":\"규정\"}\n".as_bytes();
        // Cut inside the first Hangul syllable.
        let cut = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&line[..cut]).is_empty());
        assert_eq!(decoder.push(&line[cut..]), vec![content("규정")]);
    }

    #[test]
    fn ignores_lines_without_prefix() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b": keep-alive\nevent: message\n\ndata: {\"type\":\"done\"}\n");
        assert_eq!(frames, vec![Frame::Done]);
        assert_eq!(decoder.dropped_lines(), 0);
    }

    #[test]
    fn drops_malformed_line_and_continues() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(
            b"data: {not json}\n\
              data: {\"type\":\"mystery\"}\n\
              data: {\"type\":\"content\",\"content\":\"ok\"}\n",
        );
        assert_eq!(frames, vec![content("ok")]);
        assert_eq!(decoder.dropped_lines(), 2);
    }

    #[test]
    fn accepts_crlf_and_missing_space() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data:{\"type\":\"stream_end\"}\r\n");
        assert_eq!(frames, vec![Frame::StreamEnd]);
    }

    #[test]
    fn blank_payload_is_skipped() {
        assert!(decode_line(b"data: ").unwrap().is_none());
        assert!(decode_line(b"data:   \r").unwrap().is_none());
    }

    #[test]
    fn finish_discards_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"done\"}").is_empty());
        decoder.finish();
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn stream_adaptor_yields_frames_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"thinking\",\"content\":\"hm")),
            Ok(Bytes::from_static(b"\"}\ndata: {\"type\":\"content\",\"content\":\"x\"}\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n")),
        ];
        let frames: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;
        let frames: Vec<Frame> = frames.into_iter().map(Result::unwrap).collect();
        assert_eq!(frames, vec![Frame::thinking("hm"), content("x"), Frame::Done]);
    }

    #[tokio::test]
    async fn stream_adaptor_stops_after_transport_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"content\",\"content\":\"a\"}\n")),
            Err(TransportError::Read("reset by peer".into())),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n")),
        ];
        let items: Vec<_> = decode_frames(stream::iter(chunks)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(content("a")));
        assert_eq!(items[1], Err(TransportError::Read("reset by peer".into())));
    }
}
