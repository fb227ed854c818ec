//! Newline-delimited JSON processing for generate-style streaming responses.
//!
//! Each line of the body is one JSON object carrying a `response` fragment.
//! Lines are parsed independently: a line that is not valid UTF-8 or not the
//! expected JSON is logged and dropped, and the stream carries on.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_PARSE_ERRORS};
use crate::types::{GenerateChunk, TextFragment};
use crate::{Error, Result};

/// Process a stream of bytes into a stream of text fragments.
///
/// Lines split across network chunks are reassembled; a final line without a
/// trailing newline is parsed when the body ends.  An error from the byte
/// stream is yielded once and ends the stream.
pub fn process_ndjson<S, E>(byte_stream: S) -> impl Stream<Item = Result<TextFragment>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        move |(mut stream, mut buffer, mut eof)| async move {
            loop {
                if let Some(line) = take_line(&mut buffer) {
                    if let Some(fragment) = parse_line(&line) {
                        return Some((Ok(fragment), (stream, buffer, eof)));
                    }
                    continue;
                }

                if eof {
                    let line = std::mem::take(&mut buffer);
                    return parse_line(&line).map(|fragment| (Ok(fragment), (stream, buffer, eof)));
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
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

/// Remove and return the first complete line in `buffer`, without its
/// terminator.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=newline).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(line)
}

/// Parse one line; `None` for blank or malformed lines.
fn parse_line(line: &[u8]) -> Option<TextFragment> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => {
            STREAM_PARSE_ERRORS.click();
            log::warn!("dropping stream line: {}", Error::from(e));
            return None;
        }
    };
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerateChunk>(text) {
        Ok(chunk) => Some(TextFragment::Chunk(chunk)),
        Err(e) => {
            STREAM_PARSE_ERRORS.click();
            log::warn!("dropping malformed stream line {text:?}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> + Unpin {
        Box::pin(stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(*part)))
                .collect::<Vec<_>>(),
        ))
    }

    async fn texts(parts: &[&'static [u8]]) -> Vec<String> {
        process_ndjson(chunks(parts))
            .map(|fragment| fragment.unwrap().text().to_string())
            .collect()
            .await
    }

    #[tokio::test]
    async fn parse_lines_in_one_chunk() {
        let data: &[u8] = b"{\"response\":\"<think>\",\"done\":false}\n{\"response\":\"hi\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
        assert_eq!(texts(&[data]).await, vec!["<think>", "hi", ""]);
    }

    #[tokio::test]
    async fn handle_split_line() {
        let got = texts(&[
            &b"{\"respo"[..],
            &b"nse\":\"Yo\"}\n{\"response\":"[..],
            &b"\" fam\"}\n"[..],
        ]).await;
        assert_eq!(got, vec!["Yo", " fam"]);
    }

    #[tokio::test]
    async fn malformed_line_is_dropped() {
        let got = texts(&[&b"{\"response\":\"a\"}\nnot json at all\n{\"nope\":1}\n{\"response\":\"b\"}\n"[..]]).await;
        assert_eq!(got, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_dropped() {
        let got = texts(&[&b"\xff\xfe\n{\"response\":\"ok\"}\n"[..]]).await;
        assert_eq!(got, vec!["ok"]);
    }

    #[tokio::test]
    async fn multibyte_split_across_chunks() {
        let got = texts(&[&b"{\"response\":\"caf\xc3"[..], &b"\xa9\"}\n"[..]]).await;
        assert_eq!(got, vec!["café"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let got = texts(&[&b"{\"response\":\"a\"}\r\n\r\n{\"response\":\"b\"}"[..]]).await;
        assert_eq!(got, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_body() {
        assert!(texts(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\"}\n{\"resp")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"{\"response\":\"never\"}\n")),
        ];
        let mut fragments = Box::pin(process_ndjson(stream::iter(parts)));

        assert_eq!(fragments.next().await.unwrap().unwrap().text(), "a");
        let err = fragments.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Streaming { .. }));
        assert!(err.is_transport());
        assert!(fragments.next().await.is_none());
    }
}
