//! qwen upstream adapter.
//!
//! The upstream speaks the OpenAI chat-completion protocol already, so the
//! request maps through nearly verbatim. Token refresh is the business of the
//! credentials collaborator, not this adapter: a rejected token surfaces as
//! an upstream error.

use serde_json::json;

use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::protocol::ChatRequest;

const SUPPORTED_MODELS: [&str; 2] = ["coder-model", "vision-model"];

#[must_use]
pub fn supports_model(model: &str) -> bool {
    SUPPORTED_MODELS.contains(&model)
}

pub struct QwenClient;

impl QwenClient {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Send one chat request, streaming or not per the client's flag.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when no token is configured,
    /// [`GatewayError::Transport`] on connection failure, or
    /// [`GatewayError::Upstream`] on a non-2xx upstream status.
    pub async fn send_chat_request(
        &self,
        http: &reqwest::Client,
        config: &AppConfig,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, GatewayError> {
        let token = config.qwen.token.as_str();
        if token.is_empty() {
            return Err(GatewayError::Auth(
                "no qwen token configured (qwen.token or QWEN_TOKEN)".into(),
            ));
        }

        let url = format!("{}/chat/completions", config.qwen.base_url);
        let body = build_request_body(request);

        tracing::debug!(model = %request.model, "sending qwen request");

        let response = http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Transport(format!("send request: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "qwen error");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: "qwen error".to_string(),
            });
        }

        Ok(response)
    }
}

impl Default for QwenClient {
    fn default() -> Self {
        Self::new()
    }
}

fn build_request_body(request: &ChatRequest) -> serde_json::Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages,
        "stream": request.stream,
    });

    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    if !request.tools.is_empty() && supports_model(&request.model) {
        body["tools"] = json!(request.tools);
    }

    body
}
