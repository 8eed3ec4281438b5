//! Server-sent events framing.

use futures::{Stream, StreamExt};

use crate::error::ApiError;

/// One dispatched SSE event. `event` is `None` for the default `message` type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental decoder fed with raw body chunks.
///
/// Multi-byte characters split across chunks are held back until complete,
/// and `\r\n` line endings are folded to `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.push_text(&text);
                return;
            }
        };
        let rest = self.pending.split_off(valid);
        let head = std::mem::replace(&mut self.pending, rest);
        // `valid` is a char boundary reported by from_utf8.
        let text = String::from_utf8_lossy(&head).into_owned();
        self.push_text(&text);
    }

    fn push_text(&mut self, text: &str) {
        self.buffer.push_str(text);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    /// Next complete event, skipping comment-only and empty blocks.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            let end = self.buffer.find("\n\n")?;
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_block(&block[..end]) {
                return Some(frame);
            }
        }
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.to_string()).filter(|v| !v.is_empty()),
            "data" => data_lines.push(value),
            "id" => frame.id = Some(value.to_string()),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

/// Turns a response body stream into SSE frames. The stream ends after the
/// first transport error, which is yielded.
pub fn sse_frames<S, B>(body: S) -> impl Stream<Item = Result<SseFrame, ApiError>>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    decoder.push(chunk.as_ref());
                    while let Some(frame) = decoder.next_frame() {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    tracing::warn!("SSE body error: {}", e);
                    yield Err(ApiError::Transport(e));
                    break;
                }
            }
        }
        tracing::debug!("SSE body ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<SseFrame> {
        let mut decoder = SseDecoder::new();
        decoder.push(input.as_bytes());
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn unnamed_events_default_to_message() {
        let frames = decode_all("data: line one\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_name(), "message");
        assert_eq!(frames[0].data, "line one");
    }

    #[test]
    fn named_events_and_ids_are_kept() {
        let frames = decode_all("id: 7\nevent: buildResult\ndata: {\"status\":\"success\"}\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("buildResult"));
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].data, "{\"status\":\"success\"}");
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let frames = decode_all("data: a\ndata:b\ndata\n\n");
        assert_eq!(frames[0].data, "a\nb\n");
    }

    #[test]
    fn crlf_and_comments_are_handled() {
        let frames = decode_all(": keep-alive\r\n\r\ndata: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn partial_frames_wait_for_the_delimiter() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: hel");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"lo\n");
        assert!(decoder.next_frame().is_none());
        decoder.push(b"\n");
        assert_eq!(decoder.next_frame().unwrap().data, "hello");
    }

    #[test]
    fn split_multibyte_characters_survive() {
        let text = "data: héllo\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        decoder.push(&text[..split]);
        decoder.push(&text[split..]);
        assert_eq!(decoder.next_frame().unwrap().data, "héllo");
    }

    #[test]
    fn split_crlf_delimiter_is_folded() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: x\r");
        decoder.push(b"\n\r\n");
        assert_eq!(decoder.next_frame().unwrap().data, "x");
    }

    #[tokio::test]
    async fn stream_adapter_yields_frames_across_chunks() {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> = vec![
            Ok(b"data: one\n".to_vec()),
            Ok(b"\ndata: two\n\n".to_vec()),
        ];
        let frames: Vec<_> = sse_frames(futures::stream::iter(chunks)).collect().await;
        let data: Vec<_> = frames
            .into_iter()
            .map(|f| f.unwrap().data)
            .collect();
        assert_eq!(data, vec!["one", "two"]);
    }
}
