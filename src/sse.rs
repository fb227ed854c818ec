//! Server-Sent Events (SSE) processing for chat-completions streaming.
//!
//! Events are separated by a blank line.  The `data:` lines of an event
//! carry one JSON chunk; `data: [DONE]` marks the end of the response.
//! Events without data (comments, keep-alives) are skipped and malformed
//! JSON is logged and dropped.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_PARSE_ERRORS};
use crate::types::{ChatCompletionChunk, TextFragment};
use crate::{Error, Result};

/// Marker payload that ends a chat-completions stream.
const DONE: &str = "[DONE]";

enum Event {
    Fragment(TextFragment),
    Done,
    Skip,
}

/// Process a stream of bytes into a stream of text fragments.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<TextFragment>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        move |(mut stream, mut buffer, mut eof)| async move {
            loop {
                let event = match take_event(&mut buffer) {
                    Some(event) => Some(event),
                    None if eof && !buffer.is_empty() => Some(std::mem::take(&mut buffer)),
                    None if eof => return None,
                    None => None,
                };

                if let Some(event) = event {
                    match parse_event(&event) {
                        Event::Fragment(fragment) => {
                            return Some((Ok(fragment), (stream, buffer, eof)));
                        }
                        Event::Done => return None,
                        Event::Skip => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend(bytes.iter().filter(|&&b| b != b'\r'));
                    }
                    Some(Err(e)) => {
                        buffer.clear();
                        eof = true;
                        return Some((
                            Err(Error::streaming(
                                format!("Error in HTTP stream: {e}"),
                                Some(Box::new(e)),
                            )),
                            (stream, buffer, eof),
                        ));
                    }
                    None => eof = true,
                }
            }
        },
    )
}

/// Remove and return the first complete event in `buffer`.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let mut event: Vec<u8> = buffer.drain(..end + 2).collect();
    event.truncate(end);
    Some(event)
}

fn parse_event(event: &[u8]) -> Event {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            STREAM_PARSE_ERRORS.click();
            log::warn!("dropping SSE event: {}", Error::from(e));
            return Event::Skip;
        }
    };

    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        return Event::Skip;
    }
    let data = data.join("\n");
    if data.trim() == DONE {
        return Event::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(&data) {
        Ok(chunk) => Event::Fragment(TextFragment::Delta(chunk)),
        Err(e) => {
            STREAM_PARSE_ERRORS.click();
            log::warn!("dropping malformed SSE event {data:?}: {e}");
            Event::Skip
        }
    }
}
