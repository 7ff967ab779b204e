//! Response assembly from the normalized delta stream.
//!
//! The same normalized deltas feed two output shapes: the stream assembler
//! emits one wire chunk per delta the moment it arrives, then a terminal
//! finish-reason chunk, an optional usage chunk, and the `[DONE]` sentinel;
//! the aggregate assembler concatenates everything and emits one response
//! object. Both count completion tokens over the identical
//! reasoning-then-content concatenation so the two paths report the same
//! usage for the same event sequence.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use smallvec::SmallVec;
use tokio::sync::mpsc::Receiver;

use crate::config::ThinkMode;
use crate::error::GatewayError;
use crate::normalize::tool_call::strip_blocks;
use crate::normalize::{NormalizedDelta, PhaseNormalizer, ToolCallAssembler};
use crate::observability::Tokenizer;
use crate::protocol::qwen::QwenResponse;
use crate::protocol::zai::ZaiEvent;
use crate::protocol::{
    ChatResponse, Choice, ResponseMessage, ToolCall, Usage, FINISH_STOP, FINISH_TOOL_CALLS,
    OBJECT_CHUNK, OBJECT_COMPLETION,
};
use crate::stream::{data_frame, done_frame};
use crate::util::{chat_completion_id, unix_now_secs};

// ---------------------------------------------------------------------------
// Chunk encoding
// ---------------------------------------------------------------------------

fn encode_response(response: &ChatResponse) -> Option<Bytes> {
    match serde_json::to_string(response) {
        Ok(json) => Some(data_frame(&json)),
        Err(err) => {
            tracing::debug!(error = %err, "failed to encode chunk");
            None
        }
    }
}

fn delta_chunk_response(model: &str, delta: ResponseMessage, finish: Option<String>) -> ChatResponse {
    ChatResponse {
        id: chat_completion_id(),
        object: OBJECT_CHUNK.to_string(),
        created: unix_now_secs(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: None,
            delta: Some(delta),
            finish_reason: finish,
        }],
        usage: None,
    }
}

// ---------------------------------------------------------------------------
// StreamAssembler
// ---------------------------------------------------------------------------

/// Builds client wire chunks from normalized deltas, in strict input order.
pub struct StreamAssembler {
    model: String,
    include_usage: bool,
    prompt_tokens: u64,
    tokenizer: Arc<Tokenizer>,
    content_parts: Vec<String>,
    reasoning_parts: Vec<String>,
    saw_tool_call: bool,
    upstream_finish: Option<String>,
    stop_role: &'static str,
}

impl StreamAssembler {
    #[must_use]
    pub fn new(
        model: &str,
        include_usage: bool,
        prompt_tokens: u64,
        tokenizer: Arc<Tokenizer>,
        stop_role: &'static str,
    ) -> Self {
        Self {
            model: model.to_string(),
            include_usage,
            prompt_tokens,
            tokenizer,
            content_parts: Vec::new(),
            reasoning_parts: Vec::new(),
            saw_tool_call: false,
            upstream_finish: None,
            stop_role,
        }
    }

    /// One chunk per content/reasoning delta.
    ///
    /// Stray tool-call markup is stripped from plain content before it
    /// reaches the client, a backstop against assembler false negatives.
    pub fn delta_chunk(&mut self, delta: &NormalizedDelta) -> Option<Bytes> {
        let message = match delta {
            NormalizedDelta::Content(text) => {
                let stripped = strip_blocks(text).into_owned();
                if self.include_usage && !stripped.is_empty() {
                    self.content_parts.push(stripped.clone());
                }
                ResponseMessage {
                    role: "assistant".to_string(),
                    content: stripped,
                    ..ResponseMessage::default()
                }
            }
            NormalizedDelta::Reasoning(text) => {
                if self.include_usage {
                    self.reasoning_parts.push(text.clone());
                }
                ResponseMessage {
                    role: "assistant".to_string(),
                    reasoning_content: text.clone(),
                    ..ResponseMessage::default()
                }
            }
            NormalizedDelta::ToolCallFragment(_) => return None,
        };

        if message.role.is_empty() && message.content.is_empty() && message.reasoning_content.is_empty()
        {
            return None;
        }
        encode_response(&delta_chunk_response(&self.model, message, None))
    }

    /// One chunk per assembled tool call; flips the terminal finish reason.
    pub fn tool_call_chunk(&mut self, call: ToolCall) -> Option<Bytes> {
        self.saw_tool_call = true;
        let message = ResponseMessage {
            role: "assistant".to_string(),
            tool_calls: vec![call],
            ..ResponseMessage::default()
        };
        encode_response(&delta_chunk_response(&self.model, message, None))
    }

    /// Passthrough chunk for an OpenAI-compatible upstream, preserving the
    /// upstream chunk id and creation time.
    pub fn passthrough_chunk(&mut self, upstream: &QwenResponse) -> Option<Bytes> {
        let choice = upstream.choices.first()?;
        if let Some(reason) = &choice.finish_reason {
            self.upstream_finish = Some(reason.clone());
        }
        let delta = choice.delta.as_ref()?;

        if self.include_usage && !delta.content.is_empty() {
            self.content_parts.push(delta.content.clone());
        }

        let response = ChatResponse {
            id: upstream.id.clone(),
            object: OBJECT_CHUNK.to_string(),
            created: upstream.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(ResponseMessage {
                    role: delta.role.clone(),
                    content: delta.content.clone(),
                    tool_calls: delta.tool_calls.clone(),
                    ..ResponseMessage::default()
                }),
                finish_reason: choice.finish_reason.clone(),
            }],
            usage: None,
        };
        encode_response(&response)
    }

    fn completion_tokens(&self) -> u64 {
        let mut text = String::new();
        for part in &self.reasoning_parts {
            text.push_str(part);
        }
        for part in &self.content_parts {
            text.push_str(part);
        }
        self.tokenizer.count(&text)
    }

    /// Terminal frames: finish-reason chunk, optional usage chunk, sentinel.
    #[must_use]
    pub fn finish(&mut self) -> SmallVec<[Bytes; 3]> {
        let mut frames = SmallVec::new();

        let finish_reason = if self.saw_tool_call {
            FINISH_TOOL_CALLS.to_string()
        } else {
            self.upstream_finish
                .take()
                .unwrap_or_else(|| FINISH_STOP.to_string())
        };

        let stop_delta = ResponseMessage {
            role: self.stop_role.to_string(),
            ..ResponseMessage::default()
        };
        if let Some(frame) =
            encode_response(&delta_chunk_response(&self.model, stop_delta, Some(finish_reason)))
        {
            frames.push(frame);
        }

        if self.include_usage {
            let completion_tokens = self.completion_tokens();
            let usage = ChatResponse {
                id: chat_completion_id(),
                object: OBJECT_CHUNK.to_string(),
                created: unix_now_secs(),
                model: self.model.clone(),
                choices: Vec::new(),
                usage: Some(Usage {
                    prompt_tokens: self.prompt_tokens,
                    completion_tokens,
                    total_tokens: self.prompt_tokens + completion_tokens,
                }),
            };
            if let Some(frame) = encode_response(&usage) {
                frames.push(frame);
            }
        }

        frames.push(done_frame());
        frames
    }
}

// ---------------------------------------------------------------------------
// AggregateAssembler
// ---------------------------------------------------------------------------

/// Concatenates the whole normalized delta stream into one response object.
pub struct AggregateAssembler {
    content_parts: Vec<String>,
    reasoning_parts: Vec<String>,
    tool_calls: Vec<ToolCall>,
}

impl AggregateAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            content_parts: Vec::new(),
            reasoning_parts: Vec::new(),
            tool_calls: Vec::new(),
        }
    }

    pub fn push(&mut self, delta: &NormalizedDelta) {
        match delta {
            NormalizedDelta::Content(text) => {
                let stripped = strip_blocks(text);
                if !stripped.is_empty() {
                    self.content_parts.push(stripped.into_owned());
                }
            }
            NormalizedDelta::Reasoning(text) => self.reasoning_parts.push(text.clone()),
            NormalizedDelta::ToolCallFragment(_) => {}
        }
    }

    pub fn push_tool_call(&mut self, call: ToolCall) {
        self.tool_calls.push(call);
    }

    /// Build the final response with usage.
    ///
    /// Tool calls and plain content are mutually exclusive in the final
    /// message; completion tokens still count the text that was produced.
    #[must_use]
    pub fn finalize(
        self,
        model: &str,
        prompt_tokens: u64,
        tokenizer: &Tokenizer,
    ) -> ChatResponse {
        let reasoning = self.reasoning_parts.concat();
        let content = self.content_parts.concat();

        let mut completion_text = String::with_capacity(reasoning.len() + content.len());
        completion_text.push_str(&reasoning);
        completion_text.push_str(&content);
        let completion_tokens = tokenizer.count(&completion_text);

        let mut message = ResponseMessage {
            role: "assistant".to_string(),
            content,
            reasoning_content: reasoning,
            ..ResponseMessage::default()
        };

        let finish_reason = if self.tool_calls.is_empty() {
            FINISH_STOP
        } else {
            message.tool_calls = self.tool_calls;
            message.content = String::new();
            FINISH_TOOL_CALLS
        };

        ChatResponse {
            id: chat_completion_id(),
            object: OBJECT_COMPLETION.to_string(),
            created: unix_now_secs(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: Some(message),
                delta: None,
                finish_reason: Some(finish_reason.to_string()),
            }],
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        }
    }
}

impl Default for AggregateAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// zai pipeline drivers
// ---------------------------------------------------------------------------

/// The per-request normalizer/assembler pairing for the zai adapter.
pub struct ZaiPipeline {
    pub(crate) normalizer: PhaseNormalizer,
    pub(crate) tool_calls: ToolCallAssembler,
}

impl ZaiPipeline {
    #[must_use]
    pub fn new(think_mode: ThinkMode, tool_call_buffer_max: usize) -> Self {
        Self {
            normalizer: PhaseNormalizer::new(think_mode),
            tool_calls: ToolCallAssembler::new(tool_call_buffer_max),
        }
    }
}

struct PendingFrames {
    frames: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingFrames {
    fn new() -> Self {
        Self {
            frames: SmallVec::new(),
            head: 0,
        }
    }

    fn push(&mut self, frame: Bytes) {
        self.frames.push(frame);
    }

    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.frames.len() {
            return None;
        }
        let frame = std::mem::take(&mut self.frames[self.head]);
        self.head += 1;
        if self.head == self.frames.len() {
            self.frames.clear();
            self.head = 0;
        }
        Some(frame)
    }
}

/// Drive the zai event channel into an SSE chunk stream.
///
/// Every yielded frame is handed to the transport as soon as it exists; no
/// frame is held back to batch with later ones.
pub fn zai_stream_body(
    events: Receiver<ZaiEvent>,
    pipeline: ZaiPipeline,
    assembler: StreamAssembler,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::unfold(
        (events, pipeline, assembler, PendingFrames::new(), false),
        |(mut events, mut pipeline, mut assembler, mut pending, mut finished)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (events, pipeline, assembler, pending, finished)));
                }
                if finished {
                    return None;
                }

                match events.recv().await {
                    Some(event) => {
                        let Some(data) = event.data else { continue };
                        match pipeline.normalizer.apply(&data) {
                            Some(NormalizedDelta::ToolCallFragment(fragment)) => {
                                match pipeline.tool_calls.feed(&fragment) {
                                    Ok(Some(call)) => {
                                        if let Some(frame) = assembler.tool_call_chunk(call) {
                                            pending.push(frame);
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(err) => {
                                        // Hard failure mid-stream: close the
                                        // wire without a terminal chunk.
                                        tracing::error!(error = %err, "aborting stream");
                                        return None;
                                    }
                                }
                            }
                            Some(delta) => {
                                if let Some(frame) = assembler.delta_chunk(&delta) {
                                    pending.push(frame);
                                }
                            }
                            None => {}
                        }
                    }
                    None => {
                        match pipeline.tool_calls.finish() {
                            Ok(Some(call)) => {
                                if let Some(frame) = assembler.tool_call_chunk(call) {
                                    pending.push(frame);
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "dropping unterminated tool call");
                            }
                        }
                        for frame in assembler.finish() {
                            pending.push(frame);
                        }
                        finished = true;
                    }
                }
            }
        },
    )
}

/// Drive the zai event channel into one aggregated response.
///
/// Consumption stops at the first `done`-flagged event or when the channel
/// closes, whichever comes first; the tool-call buffer then gets its one
/// final assembly attempt.
///
/// # Errors
///
/// Returns [`GatewayError::ToolCallOverflow`] when the accumulated tool-call
/// buffer exceeds its cap.
pub async fn zai_aggregate_response(
    mut events: Receiver<ZaiEvent>,
    mut pipeline: ZaiPipeline,
    model: &str,
    prompt_tokens: u64,
    tokenizer: &Tokenizer,
) -> Result<ChatResponse, GatewayError> {
    let mut assembler = AggregateAssembler::new();

    while let Some(event) = events.recv().await {
        let Some(data) = event.data else { continue };
        let done = data.done;
        match pipeline.normalizer.apply(&data) {
            Some(NormalizedDelta::ToolCallFragment(fragment)) => {
                pipeline.tool_calls.append(&fragment)?;
            }
            Some(delta) => assembler.push(&delta),
            None => {}
        }
        if done {
            break;
        }
    }

    match pipeline.tool_calls.finish() {
        Ok(Some(call)) => assembler.push_tool_call(call),
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, "dropping unterminated tool call");
        }
    }

    Ok(assembler.finalize(model, prompt_tokens, tokenizer))
}

// ---------------------------------------------------------------------------
// qwen passthrough driver
// ---------------------------------------------------------------------------

/// Drive the qwen chunk channel into an SSE chunk stream.
pub fn qwen_stream_body(
    events: Receiver<QwenResponse>,
    assembler: StreamAssembler,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    futures_util::stream::unfold(
        (events, assembler, PendingFrames::new(), false),
        |(mut events, mut assembler, mut pending, mut finished)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (events, assembler, pending, finished)));
                }
                if finished {
                    return None;
                }

                match events.recv().await {
                    Some(chunk) => {
                        if let Some(frame) = assembler.passthrough_chunk(&chunk) {
                            pending.push(frame);
                        }
                    }
                    None => {
                        for frame in assembler.finish() {
                            pending.push(frame);
                        }
                        finished = true;
                    }
                }
            }
        },
    )
}
