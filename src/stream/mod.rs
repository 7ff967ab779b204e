pub mod assemble;
pub mod ingest;

pub use assemble::{AggregateAssembler, StreamAssembler};
pub use ingest::spawn_event_reader;

use bytes::Bytes;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encode a JSON payload as one SSE data frame.
#[must_use]
pub fn data_frame(json: &str) -> Bytes {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    Bytes::from(out)
}

/// The literal end-of-stream sentinel frame.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_wraps_payload() {
        assert_eq!(data_frame(r#"{"a":1}"#).as_ref(), b"data: {\"a\":1}\n\n");
    }

    #[test]
    fn done_frame_is_the_sentinel() {
        assert_eq!(done_frame().as_ref(), b"data: [DONE]\n\n");
    }
}
