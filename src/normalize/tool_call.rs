//! Tool-call block assembly.
//!
//! A tool call arrives as a tagged span
//! `<glm_block … tool_call_name="NAME">{json}</glm_block>` that may be split
//! anywhere across events, including mid-token. Fragments accumulate in an
//! append-only buffer and the full buffer is re-scanned on every feed, so
//! assembly is invariant to how the block was split. The wrapper JSON carries
//! `data.metadata.{id,name,arguments}`; the authoritative function name is
//! the tag attribute, not the JSON body.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::protocol::{FunctionCall, ToolCall};
use crate::util::tool_call_id;

static GLM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<glm_block[^>]*tool_call_name="([^"]+)"[^>]*>(.+?)</glm_block>"#).unwrap()
});

#[derive(Debug, Default, Deserialize)]
struct BlockWrapper {
    #[serde(rename = "type", default)]
    _kind: String,
    #[serde(default)]
    data: BlockData,
}

#[derive(Debug, Default, Deserialize)]
struct BlockData {
    #[serde(default)]
    metadata: BlockMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct BlockMetadata {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

/// The stream ended while a tool-call block was still incomplete.
///
/// Recoverable: the request can still complete without a tool call; the
/// caller decides whether to log, drop, or fail.
#[derive(Debug, thiserror::Error)]
#[error("stream ended with {buffered} buffered tool-call bytes that never parsed")]
pub struct UnterminatedToolCall {
    pub buffered: usize,
}

/// Accumulates tool-call fragments until a complete block parses.
pub struct ToolCallAssembler {
    buffer: String,
    limit: usize,
}

impl ToolCallAssembler {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
        }
    }

    /// Append one fragment and attempt assembly over the whole buffer.
    ///
    /// A successful parse clears the buffer; a failed parse preserves it for
    /// the next fragment.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ToolCallOverflow`] when the buffer would exceed
    /// the configured cap; the request cannot be completed correctly past
    /// that point.
    pub fn feed(&mut self, fragment: &str) -> Result<Option<ToolCall>, GatewayError> {
        self.buffer.push_str(fragment);
        if self.buffer.len() > self.limit {
            return Err(GatewayError::ToolCallOverflow { limit: self.limit });
        }

        match parse_block(&self.buffer) {
            Some(call) => {
                self.buffer.clear();
                Ok(Some(call))
            }
            None => Ok(None),
        }
    }

    /// Append one fragment without attempting assembly.
    ///
    /// The aggregate path accumulates the whole stream and assembles once at
    /// the end, via [`ToolCallAssembler::finish`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ToolCallOverflow`] when the buffer would exceed
    /// the configured cap.
    pub fn append(&mut self, fragment: &str) -> Result<(), GatewayError> {
        self.buffer.push_str(fragment);
        if self.buffer.len() > self.limit {
            return Err(GatewayError::ToolCallOverflow { limit: self.limit });
        }
        Ok(())
    }

    /// Final assembly attempt at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`UnterminatedToolCall`] when unparseable bytes remain.
    pub fn finish(&mut self) -> Result<Option<ToolCall>, UnterminatedToolCall> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match parse_block(&self.buffer) {
            Some(call) => {
                self.buffer.clear();
                Ok(Some(call))
            }
            None => Err(UnterminatedToolCall {
                buffered: self.buffer.len(),
            }),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Parse a complete tagged block out of `content`, if one is present.
#[must_use]
pub fn parse_block(content: &str) -> Option<ToolCall> {
    let captures = GLM_BLOCK.captures(content)?;
    let tag_name = captures.get(1)?.as_str();
    let json = captures.get(2)?.as_str();

    let wrapper: BlockWrapper = match serde_json::from_str(json) {
        Ok(wrapper) => wrapper,
        Err(err) => {
            tracing::debug!(error = %err, "tool call json not yet complete");
            return None;
        }
    };

    let metadata = wrapper.data.metadata;
    let id = if metadata.id.is_empty() {
        tool_call_id()
    } else {
        metadata.id
    };
    let arguments = if metadata.arguments.is_empty() {
        "{}".to_string()
    } else {
        metadata.arguments
    };
    // metadata.name is advisory; the tag attribute wins
    let _ = metadata.name;

    Some(ToolCall {
        id,
        kind: "function".to_string(),
        function: FunctionCall {
            name: tag_name.to_string(),
            arguments,
        },
    })
}

/// Remove any complete tagged block from arbitrary content.
///
/// Used to scrub leaked tool-call markup out of plain content before it
/// reaches the client; a no-op when no block is present.
#[must_use]
pub fn strip_blocks(content: &str) -> Cow<'_, str> {
    if !content.contains("glm_block") {
        return Cow::Borrowed(content);
    }
    GLM_BLOCK.replace_all(content, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = concat!(
        r#"<glm_block view="card" tool_call_name="get_weather">"#,
        r#"{"type": "mcp", "data": {"metadata": {"id": "call_abc", "name": "weather", "#,
        r#""arguments": "{\"city\":\"SF\"}"}}}"#,
        r#"</glm_block>"#
    );

    #[test]
    fn single_feed_assembles_complete_block() {
        let mut assembler = ToolCallAssembler::new(64 * 1024);
        let call = assembler.feed(BLOCK).unwrap().expect("tool call");
        assert_eq!(call.id, "call_abc");
        assert_eq!(call.kind, "function");
        // name comes from the tag attribute, not the json body
        assert_eq!(call.function.name, "get_weather");
        assert_eq!(call.function.arguments, r#"{"city":"SF"}"#);
        assert!(assembler.is_empty());
    }

    #[test]
    fn split_feeds_assemble_identically() {
        let whole = {
            let mut assembler = ToolCallAssembler::new(64 * 1024);
            assembler.feed(BLOCK).unwrap().expect("tool call")
        };

        for chunk_size in [1, 3, 7, 16, 55] {
            let mut assembler = ToolCallAssembler::new(64 * 1024);
            let mut last = None;
            let bytes = BLOCK.as_bytes();
            let mut start = 0;
            while start < bytes.len() {
                let mut end = (start + chunk_size).min(bytes.len());
                while !BLOCK.is_char_boundary(end) {
                    end += 1;
                }
                let result = assembler.feed(&BLOCK[start..end]).unwrap();
                if let Some(call) = result {
                    assert!(last.is_none(), "assembled more than once");
                    last = Some(call);
                }
                start = end;
            }
            let call = last.expect("tool call from split feed");
            assert_eq!(call.function.name, whole.function.name);
            assert_eq!(call.function.arguments, whole.function.arguments);
            assert_eq!(call.id, whole.id);
        }
    }

    #[test]
    fn partial_block_keeps_buffering() {
        let mut assembler = ToolCallAssembler::new(64 * 1024);
        let (head, _) = BLOCK.split_at(BLOCK.len() / 2);
        assert!(assembler.feed(head).unwrap().is_none());
        assert!(!assembler.is_empty());
    }

    #[test]
    fn bad_json_inside_block_keeps_buffering() {
        let mut assembler = ToolCallAssembler::new(64 * 1024);
        let result = assembler
            .feed(r#"<glm_block tool_call_name="f">{"type": </glm_block>"#)
            .unwrap();
        assert!(result.is_none());
        assert!(!assembler.is_empty());
    }

    #[test]
    fn missing_id_and_arguments_get_defaults() {
        let block = r#"<glm_block tool_call_name="noop">{"type": "mcp", "data": {"metadata": {}}}</glm_block>"#;
        let call = parse_block(block).expect("tool call");
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.function.arguments, "{}");
        assert_eq!(call.function.name, "noop");
    }

    #[test]
    fn overflow_is_a_hard_error() {
        let mut assembler = ToolCallAssembler::new(8);
        let err = assembler.feed("0123456789").unwrap_err();
        assert!(matches!(err, GatewayError::ToolCallOverflow { limit: 8 }));
    }

    #[test]
    fn finish_surfaces_unterminated_buffer() {
        let mut assembler = ToolCallAssembler::new(64 * 1024);
        assembler.feed("<glm_block tool_call_nam").unwrap();
        let err = assembler.finish().unwrap_err();
        assert_eq!(err.buffered, "<glm_block tool_call_nam".len());
    }

    #[test]
    fn finish_on_empty_buffer_is_clean() {
        let mut assembler = ToolCallAssembler::new(64 * 1024);
        assert!(assembler.finish().unwrap().is_none());
    }

    #[test]
    fn strip_removes_block_from_surrounding_text() {
        let text = format!("before {BLOCK} after");
        let stripped = strip_blocks(&text);
        assert_eq!(stripped, "before  after");
    }

    #[test]
    fn strip_without_block_is_borrowed_noop() {
        let stripped = strip_blocks("plain text");
        assert!(matches!(stripped, Cow::Borrowed("plain text")));
    }
}
