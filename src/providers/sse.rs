//! Server-sent event framing.
//!
//! Splits a byte stream into event payloads: events are separated by a blank
//! line, `data:` lines are joined, comments and other fields are skipped, and
//! a `[DONE]` payload ends the stream.

use futures_util::{Stream, StreamExt, stream};

use crate::{MimirError, Result};

const DONE_SIGNAL: &str = "[DONE]";

/// Turn a stream of byte chunks into a stream of `data` payloads.
///
/// Bytes are buffered until a full event is available, so events split
/// across chunks (or a multi-byte character split across chunks) decode
/// correctly. A transport error is forwarded and ends the stream.
pub(crate) fn data_payloads<S, B, E>(input: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    stream::unfold(
        Some((input, Vec::<u8>::new())),
        |state| async move {
            let (mut input, mut buf) = state?;
            loop {
                if let Some((end, delimiter)) = find_event_end(&buf) {
                    let event: Vec<u8> = buf.drain(..end + delimiter).take(end).collect();
                    match parse_event(&event) {
                        Event::Data(payload) => return Some((Ok(payload), Some((input, buf)))),
                        Event::Done => return None,
                        Event::Skip => continue,
                    }
                }

                match input.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        return Some((Err(MimirError::Stream(e.to_string())), None));
                    }
                    None => {
                        // Trailing event without its blank line.
                        let rest = std::mem::take(&mut buf);
                        return match parse_event(&rest) {
                            Event::Data(payload) => Some((Ok(payload), None)),
                            Event::Done | Event::Skip => None,
                        };
                    }
                }
            }
        },
    )
}

enum Event {
    Data(String),
    Done,
    Skip,
}

/// Position of the first blank line and the length of its delimiter.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(raw: &[u8]) -> Event {
    let text = String::from_utf8_lossy(raw);
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    if data.is_empty() {
        return Event::Skip;
    }
    let payload = data.join("\n");
    if payload.trim() == DONE_SIGNAL {
        Event::Done
    } else if payload.trim().is_empty() {
        Event::Skip
    } else {
        Event::Data(payload)
    }
}
