//! `POST /v1/chat/completions`.
//!
//! Validates the request, routes it to an adapter, and shapes the response:
//! streaming requests get a chunked SSE body, non-streaming requests one
//! aggregated JSON object. Both shapes are derived from the same normalized
//! delta stream the adapter's ingest/normalize pairing produces.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Response};

use crate::error::GatewayError;
use crate::observability::log_request_complete;
use crate::protocol::qwen::QwenResponse;
use crate::protocol::validate::validate_request;
use crate::protocol::zai::ZaiEvent;
use crate::protocol::{
    extract_message_text, ChatRequest, ChatResponse, Choice, ResponseMessage, Usage, FINISH_STOP,
    FINISH_TOOL_CALLS, OBJECT_COMPLETION,
};
use crate::providers::{route_model, ProviderKind};
use crate::state::AppState;
use crate::stream::assemble::{
    qwen_stream_body, zai_aggregate_response, zai_stream_body, StreamAssembler, ZaiPipeline,
};
use crate::stream::spawn_event_reader;
use crate::util::{chat_completion_id, generate_id, unix_now_secs};

pub(crate) async fn handler(state: Arc<AppState>, body: bytes::Bytes) -> Response {
    match handler_inner(state, body).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handler_inner(
    state: Arc<AppState>,
    body: bytes::Bytes,
) -> Result<Response, GatewayError> {
    let mut request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|err| GatewayError::InvalidRequest(format!("invalid json: {err}")))?;
    validate_request(&request)?;

    if request.model.is_empty() {
        request.model = state.config.model.default.clone();
    }
    let provider = route_model(&request.model)?;

    let chat_id = generate_id();
    tracing::info!(
        provider = provider.name(),
        model = %request.model,
        stream = request.stream,
        messages = request.messages.len(),
        "chat request"
    );

    let started = Instant::now();
    match provider {
        ProviderKind::Zai => handle_zai(state, request, &chat_id, started).await,
        ProviderKind::Qwen => handle_qwen(state, request, started).await,
    }
}

// ---------------------------------------------------------------------------
// zai
// ---------------------------------------------------------------------------

async fn handle_zai(
    state: Arc<AppState>,
    request: ChatRequest,
    chat_id: &str,
    started: Instant,
) -> Result<Response, GatewayError> {
    let upstream = state
        .zai
        .send_chat_request(&state.http, &state.config, &request, chat_id)
        .await?;
    let events = spawn_event_reader::<ZaiEvent, _, _>(upstream.bytes_stream());
    let pipeline = ZaiPipeline::new(
        state.config.model.think_mode,
        state.config.limits.tool_call_buffer_max,
    );

    if request.stream {
        let include_usage = request.include_usage();
        let prompt_tokens = if include_usage {
            state
                .tokenizer
                .count(&extract_message_text(&request.messages))
        } else {
            0
        };
        let assembler = StreamAssembler::new(
            &request.model,
            include_usage,
            prompt_tokens,
            Arc::clone(&state.tokenizer),
            "assistant",
        );
        let body = Body::from_stream(zai_stream_body(events, pipeline, assembler));
        return Ok(sse_response(body));
    }

    let prompt_tokens = state
        .tokenizer
        .count(&extract_message_text(&request.messages));
    let response = zai_aggregate_response(
        events,
        pipeline,
        &request.model,
        prompt_tokens,
        &state.tokenizer,
    )
    .await?;

    if let Some(usage) = &response.usage {
        log_request_complete("zai", &request.model, usage, started);
    }
    Ok(axum::Json(response).into_response())
}

// ---------------------------------------------------------------------------
// qwen
// ---------------------------------------------------------------------------

async fn handle_qwen(
    state: Arc<AppState>,
    request: ChatRequest,
    started: Instant,
) -> Result<Response, GatewayError> {
    let upstream = state
        .qwen
        .send_chat_request(&state.http, &state.config, &request)
        .await?;

    if request.stream {
        let include_usage = request.include_usage();
        let prompt_tokens = if include_usage {
            state
                .tokenizer
                .count(&extract_message_text(&request.messages))
        } else {
            0
        };
        let events = spawn_event_reader::<QwenResponse, _, _>(upstream.bytes_stream());
        let assembler = StreamAssembler::new(
            &request.model,
            include_usage,
            prompt_tokens,
            Arc::clone(&state.tokenizer),
            "",
        );
        let body = Body::from_stream(qwen_stream_body(events, assembler));
        return Ok(sse_response(body));
    }

    let wire: QwenResponse = upstream
        .json()
        .await
        .map_err(|err| GatewayError::Transport(format!("failed to parse response: {err}")))?;

    let response = map_qwen_completion(wire, &request, &state)?;
    if let Some(usage) = &response.usage {
        log_request_complete("qwen", &request.model, usage, started);
    }
    Ok(axum::Json(response).into_response())
}

/// Map one qwen completion body to the client wire shape.
///
/// Upstream-reported usage is preferred; a missing block is filled with local
/// estimates.
fn map_qwen_completion(
    wire: QwenResponse,
    request: &ChatRequest,
    state: &AppState,
) -> Result<ChatResponse, GatewayError> {
    let Some(choice) = wire.choices.into_iter().next() else {
        return Err(GatewayError::Internal("empty upstream response".into()));
    };

    let mut message = ResponseMessage {
        role: "assistant".to_string(),
        ..ResponseMessage::default()
    };
    if let Some(wire_message) = choice.message {
        message.content = wire_message.content;
        message.tool_calls = wire_message.tool_calls;
    }

    let finish_reason = if message.tool_calls.is_empty() {
        choice
            .finish_reason
            .unwrap_or_else(|| FINISH_STOP.to_string())
    } else {
        FINISH_TOOL_CALLS.to_string()
    };

    let usage = wire.usage.unwrap_or_else(|| {
        let prompt_tokens = state
            .tokenizer
            .count(&extract_message_text(&request.messages));
        let completion_tokens = state.tokenizer.count(&message.content);
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    });

    let id = if wire.id.is_empty() {
        chat_completion_id()
    } else {
        wire.id
    };
    let created = if wire.created == 0 {
        unix_now_secs()
    } else {
        wire.created
    };

    Ok(ChatResponse {
        id,
        object: OBJECT_COMPLETION.to_string(),
        created,
        model: request.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: Some(message),
            delta: None,
            finish_reason: Some(finish_reason),
        }],
        usage: Some(usage),
    })
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
