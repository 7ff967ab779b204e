//! Event ingestion from an upstream response body.
//!
//! Upstream events are newline-delimited `data: <json>` lines terminated by a
//! literal `data: [DONE]` sentinel. A spawned producer task frames the byte
//! stream into lines, decodes each payload, and hands typed events to the
//! request task over an unbuffered ordered channel: the producer blocks on
//! every send until the consumer is ready, so the upstream read loop can
//! never outrun the client write path. When the consumer drops the receiver
//! (client disconnect), the next send fails and the producer tears down the
//! upstream connection by returning.

use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental newline framer over arbitrary byte chunk boundaries.
pub(crate) struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Feed one chunk and append every completed line to `out`.
    pub(crate) fn push_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);

        let mut consumed = 0;
        for pos in memchr_iter(b'\n', &self.buffer) {
            let mut line = &self.buffer[consumed..pos];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            out.push(String::from_utf8_lossy(line).into_owned());
            consumed = pos + 1;
        }
        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
    }

    /// The final unterminated line, if any remains when the stream closes.
    pub(crate) fn take_tail(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(tail)
    }
}

pub(crate) enum LinePayload<T> {
    Event(T),
    Done,
    Skip,
}

/// Classify and decode one framed line.
///
/// Heartbeats, blank lines, and anything without the `data: ` prefix are
/// discarded. A payload that fails to decode is logged and skipped; it never
/// aborts the sequence.
pub(crate) fn decode_data_line<T: DeserializeOwned>(line: &str) -> LinePayload<T> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LinePayload::Skip;
    };
    if payload.trim() == DONE_SENTINEL {
        return LinePayload::Done;
    }
    match serde_json::from_str(payload) {
        Ok(event) => LinePayload::Event(event),
        Err(err) => {
            tracing::debug!(error = %err, data = payload, "skipping undecodable event");
            LinePayload::Skip
        }
    }
}

/// Spawn the per-request producer task and return the consumer side.
///
/// The returned receiver yields events in exactly the order they were read
/// from the upstream connection. The channel closes when the upstream stream
/// ends, the sentinel is seen, or a read fails.
pub fn spawn_event_reader<T, S, E>(byte_stream: S) -> mpsc::Receiver<T>
where
    T: DeserializeOwned + Send + 'static,
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut stream = Box::pin(byte_stream);
        let mut framer = LineFramer::new();
        let mut lines = Vec::with_capacity(8);

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(error = %err, "event stream read error");
                    return;
                }
            };

            lines.clear();
            framer.push_into(&bytes, &mut lines);
            for line in lines.drain(..) {
                match decode_data_line::<T>(&line) {
                    LinePayload::Event(event) => {
                        if tx.send(event).await.is_err() {
                            // Consumer is gone; stop reading so the upstream
                            // connection is dropped.
                            return;
                        }
                    }
                    LinePayload::Done => return,
                    LinePayload::Skip => {}
                }
            }
        }

        if let Some(tail) = framer.take_tail() {
            if let LinePayload::Event(event) = decode_data_line::<T>(&tail) {
                let _ = tx.send(event).await;
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::zai::ZaiEvent;
    use bytes::Bytes;
    use std::convert::Infallible;

    fn byte_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
        futures_util::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))))
    }

    async fn collect_events(chunks: Vec<&'static [u8]>) -> Vec<ZaiEvent> {
        let mut rx = spawn_event_reader::<ZaiEvent, _, _>(byte_stream(chunks));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn framer_handles_split_lines() {
        let mut framer = LineFramer::new();
        let mut out = Vec::new();
        framer.push_into(b"data: par", &mut out);
        assert!(out.is_empty());
        framer.push_into(b"tial\ndata: next\n", &mut out);
        assert_eq!(out, vec!["data: partial", "data: next"]);
    }

    #[test]
    fn framer_strips_carriage_returns_and_keeps_tail() {
        let mut framer = LineFramer::new();
        let mut out = Vec::new();
        framer.push_into(b"data: a\r\ndata: tail", &mut out);
        assert_eq!(out, vec!["data: a"]);
        assert_eq!(framer.take_tail().as_deref(), Some("data: tail"));
        assert!(framer.take_tail().is_none());
    }

    #[test]
    fn decode_skips_non_data_lines() {
        assert!(matches!(
            decode_data_line::<ZaiEvent>(": heartbeat"),
            LinePayload::Skip
        ));
        assert!(matches!(
            decode_data_line::<ZaiEvent>(""),
            LinePayload::Skip
        ));
        assert!(matches!(
            decode_data_line::<ZaiEvent>("data: [DONE]"),
            LinePayload::Done
        ));
    }

    #[tokio::test]
    async fn reads_events_in_order() {
        let events = collect_events(vec![
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"Hello\"}}\n",
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\" World\",\"done\":true}}\n",
            b"data: [DONE]\n",
        ])
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data.as_ref().unwrap().delta_content, "Hello");
        assert_eq!(events[1].data.as_ref().unwrap().delta_content, " World");
    }

    #[tokio::test]
    async fn sentinel_terminates_before_later_events() {
        let events = collect_events(vec![
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"kept\"}}\n",
            b"data: [DONE]\n",
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"dropped\"}}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap().delta_content, "kept");
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped_not_fatal() {
        let events = collect_events(vec![
            b"data: {not json\n",
            b": ping\n",
            b"\n",
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"ok\"}}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap().delta_content, "ok");
    }

    #[tokio::test]
    async fn event_split_across_chunks_reassembles() {
        let events = collect_events(vec![
            b"data: {\"data\":{\"phase\":\"ans",
            b"wer\",\"delta_content\":\"joined\"}}\n",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap().delta_content, "joined");
    }

    #[tokio::test]
    async fn final_unterminated_line_is_still_decoded() {
        let events = collect_events(vec![
            b"data: {\"data\":{\"phase\":\"answer\",\"delta_content\":\"tail\"}}",
        ])
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_ref().unwrap().delta_content, "tail");
    }
}
