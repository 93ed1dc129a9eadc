//! Line decoder for `data: <json>` records
//!
//! The chat endpoint answers with a chunked body of newline-delimited
//! records. Chunk boundaries are arbitrary: a record, or a single UTF-8
//! character, may be split across any number of chunks. The decoder
//! buffers raw bytes and only interprets complete lines.

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, warn};
use serde_json::Value;

/// Prefix carried by every record line
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream without producing an event
pub const DONE_SENTINEL: &str = "[DONE]";

/// One semantic unit decoded from the stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Text to append to the assistant message
    ContentDelta(String),
    /// Normal completion with the backend's final state
    Done(Value),
    /// Terminal failure reported by the backend or the transport
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ContentDelta(_))
    }
}

/// Truthiness of a payload field, as the backend's own clients read it
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Interpret one record. Fields of unexpected types are not errors: a
/// truthy `content` or `error` is stringified.
fn payload_event(mut payload: Value) -> Option<StreamEvent> {
    let mut field = |key: &str| {
        payload
            .get_mut(key)
            .map(Value::take)
            .filter(is_truthy)
    };

    if let Some(content) = field("content") {
        return Some(StreamEvent::ContentDelta(into_text(content)));
    }
    if field("event").as_ref().and_then(Value::as_str) == Some("done") {
        return Some(StreamEvent::Done(field("state").unwrap_or(Value::Null)));
    }
    field("error").map(|e| StreamEvent::Error(into_text(e)))
}

/// Incremental decoder fed with raw byte chunks
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    terminated: bool,
    malformed_lines: usize,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.decode_line(&line[..newline], &mut events);
        }
        events
    }

    /// Decode whatever is left in the buffer once the source is exhausted.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let mut events = Vec::new();
        if !rest.is_empty() {
            self.decode_line(&rest, &mut events);
        }
        events
    }

    /// True once a terminal event or the sentinel has been seen
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of record lines dropped because their payload was not valid JSON
    #[must_use]
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        if self.terminated {
            return;
        }

        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        if payload.trim() == DONE_SENTINEL {
            debug!("Stream sentinel received");
            self.terminated = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(parsed) => {
                if let Some(event) = payload_event(parsed) {
                    if event.is_terminal() {
                        self.terminated = true;
                    }
                    events.push(event);
                }
            }
            Err(e) => {
                self.malformed_lines += 1;
                warn!("Skipping malformed stream record ({e}): {payload}");
            }
        }
    }
}

struct DecodeState<S> {
    source: S,
    decoder: LineDecoder,
    ready: VecDeque<StreamEvent>,
    exhausted: bool,
}

/// Turn a chunked byte source into an ordered, lazy sequence of events.
///
/// The sequence ends when the source is exhausted or right after a
/// terminal event. A transport error becomes one final `Error` event.
pub fn decode_stream<S, E>(source: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let state = DecodeState {
        source: Box::pin(source),
        decoder: LineDecoder::new(),
        ready: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((event, state));
            }
            if state.exhausted || state.decoder.is_terminated() {
                return None;
            }

            match state.source.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.decoder.push(&chunk)),
                Some(Err(e)) => {
                    warn!("Stream transport failed: {e}");
                    state.exhausted = true;
                    state.ready.push_back(StreamEvent::Error(e.to_string()));
                }
                None => {
                    state.exhausted = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_STREAM: &str = concat!(
        "data: {\"content\":\"Hel\"}\n",
        "data: {\"content\":\"lo\"}\n",
        "data: {\"event\":\"done\"}\n",
    );

    fn decode_chunks(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = LineDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn hello_events() -> Vec<StreamEvent> {
        vec![
            StreamEvent::ContentDelta("Hel".to_string()),
            StreamEvent::ContentDelta("lo".to_string()),
            StreamEvent::Done(Value::Null),
        ]
    }

    #[test]
    fn whole_stream_in_one_chunk() {
        assert_eq!(decode_chunks(&[HELLO_STREAM.as_bytes()]), hello_events());
    }

    #[test]
    fn three_chunks_split_mid_line() {
        let bytes = HELLO_STREAM.as_bytes();
        let events = decode_chunks(&[&bytes[..9], &bytes[9..40], &bytes[40..]]);
        assert_eq!(events, hello_events());
    }

    #[test]
    fn every_two_way_split_yields_same_events() {
        let bytes = HELLO_STREAM.as_bytes();
        for split in 0..=bytes.len() {
            let events = decode_chunks(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(events, hello_events(), "split at byte {split}");
        }
    }

    #[test]
    fn byte_at_a_time() {
        let chunks: Vec<&[u8]> = HELLO_STREAM.as_bytes().chunks(1).collect();
        assert_eq!(decode_chunks(&chunks), hello_events());
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let line = "data: {\"content\":\"读论文\"}\n";
        let bytes = line.as_bytes();
        let split = line.find('读').unwrap() + 1;
        let events = decode_chunks(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(events, vec![StreamEvent::ContentDelta("读论文".to_string())]);
    }

    #[test]
    fn lines_without_prefix_are_ignored() {
        let stream = concat!(
            ": keep-alive\n",
            "\n",
            "event: message\n",
            "{\"content\":\"bare\"}\n",
            "data:{\"content\":\"no space\"}\n",
            "data: {\"content\":\"kept\"}\n",
        );
        let events = decode_chunks(&[stream.as_bytes()]);
        assert_eq!(events, vec![StreamEvent::ContentDelta("kept".to_string())]);
    }

    #[test]
    fn malformed_json_is_skipped_and_counted() {
        let stream = concat!(
            "data: {\"content\":\"a\"}\n",
            "data: {not json\n",
            "data: {\"content\":\"b\"}\n",
        );
        let mut decoder = LineDecoder::new();
        let events = decoder.push(stream.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("a".to_string()),
                StreamEvent::ContentDelta("b".to_string()),
            ]
        );
        assert_eq!(decoder.malformed_lines(), 1);
    }

    #[test]
    fn done_carries_final_state() {
        let events = decode_chunks(&[b"data: {\"event\":\"done\",\"state\":{\"turn\":3}}\n"]);
        assert_eq!(
            events,
            vec![StreamEvent::Done(serde_json::json!({ "turn": 3 }))]
        );
    }

    #[test]
    fn error_drains_remaining_lines_silently() {
        let stream = concat!(
            "data: {\"content\":\"partial\"}\n",
            "data: {\"error\":\"model overloaded\"}\n",
            "data: {\"content\":\"late\"}\n",
            "data: {\"event\":\"done\"}\n",
        );
        let mut decoder = LineDecoder::new();
        let events = decoder.push(stream.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("partial".to_string()),
                StreamEvent::Error("model overloaded".to_string()),
            ]
        );
        assert!(decoder.is_terminated());
        assert!(decoder.push(b"data: {\"content\":\"more\"}\n").is_empty());
    }

    #[test]
    fn sentinel_ends_without_event() {
        let stream = concat!(
            "data: {\"content\":\"x\"}\n",
            "data: [DONE]\n",
            "data: {\"content\":\"y\"}\n",
        );
        let mut decoder = LineDecoder::new();
        let events = decoder.push(stream.as_bytes());
        assert_eq!(events, vec![StreamEvent::ContentDelta("x".to_string())]);
        assert!(decoder.is_terminated());
    }

    #[test]
    fn unterminated_final_line_is_decoded() {
        let events = decode_chunks(&[b"data: {\"content\":\"a\"}\ndata: {\"event\":\"done\"}"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("a".to_string()),
                StreamEvent::Done(Value::Null),
            ]
        );
    }

    #[test]
    fn crlf_line_endings() {
        let events = decode_chunks(&[b"data: {\"content\":\"a\"}\r\n\r\ndata: {\"event\":\"done\"}\r\n"]);
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("a".to_string()),
                StreamEvent::Done(Value::Null),
            ]
        );
    }

    #[test]
    fn empty_content_and_unknown_payloads_produce_nothing() {
        let stream = concat!(
            "data: {\"content\":\"\"}\n",
            "data: {\"event\":\"progress\"}\n",
            "data: {}\n",
        );
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(stream.as_bytes()).is_empty());
        assert_eq!(decoder.malformed_lines(), 0);
        assert!(!decoder.is_terminated());
    }

    #[test]
    fn loosely_typed_fields_are_not_malformed() {
        let stream = concat!(
            "data: {\"content\":5}\n",
            "data: {\"content\":null,\"event\":\"progress\",\"state\":[1]}\n",
            "data: {\"error\":{\"msg\":\"quota\"}}\n",
        );
        let mut decoder = LineDecoder::new();
        let events = decoder.push(stream.as_bytes());
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("5".to_string()),
                StreamEvent::Error("{\"msg\":\"quota\"}".to_string()),
            ]
        );
        assert_eq!(decoder.malformed_lines(), 0);
    }

    #[test]
    fn falsy_content_falls_through_to_done() {
        let stream = concat!(
            "data: {\"content\":false,\"error\":\"\"}\n",
            "data: {\"content\":0,\"event\":\"done\",\"state\":{\"turn\":1}}\n",
        );
        let events = decode_chunks(&[stream.as_bytes()]);
        assert_eq!(
            events,
            vec![StreamEvent::Done(serde_json::json!({ "turn": 1 }))]
        );
    }
}
