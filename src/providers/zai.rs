//! zai upstream adapter.
//!
//! Builds a browser-session chat request: signed query parameters, mimicry
//! headers, and a body carrying flattened messages, tool schemas, and the
//! feature toggles the web client sends.

use serde_json::json;
use url::Url;

use crate::auth::UserCache;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::protocol::{last_user_message_text, ChatRequest};
use crate::signing::{sign_request, SignatureParams};
use crate::util::{generate_id, unix_now_millis};

const KNOWN_MODELS: [&str; 4] = ["GLM-4-6-API-V1", "GLM-4-Flash", "GLM-4-Air", "GLM-4-Plus"];

/// zai serves its known models and anything outside the qwen namespaces.
#[must_use]
pub fn supports_model(model: &str) -> bool {
    KNOWN_MODELS.contains(&model)
        || (!model.starts_with("coder-") && !model.starts_with("vision-"))
}

pub struct ZaiClient {
    users: UserCache,
}

impl ZaiClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: UserCache::new(),
        }
    }

    /// Open the upstream event stream for one chat request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Auth`] when credentials cannot be resolved,
    /// [`GatewayError::Transport`] on connection failure, or
    /// [`GatewayError::Upstream`] on a non-2xx upstream status.
    pub async fn send_chat_request(
        &self,
        http: &reqwest::Client,
        config: &AppConfig,
        request: &ChatRequest,
        chat_id: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let timestamp = unix_now_millis();
        let request_id = generate_id();
        let user = self.users.get_user(http, config).await?;

        let mut body = build_request_body(request, config, chat_id);

        let mut url = Url::parse(&format!("{}/api/v2/chat/completions", config.upstream.origin()))
            .map_err(|err| GatewayError::Internal(format!("upstream url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("timestamp", &timestamp.to_string())
            .append_pair("requestId", &request_id)
            .append_pair("version", "0.0.1")
            .append_pair("platform", "web")
            .append_pair("token", &user.token)
            .append_pair("user_id", &user.id);

        let last_message = last_user_message_text(&request.messages);
        let params = SignatureParams {
            request_id: &request_id,
            timestamp_millis: timestamp,
            user_id: &user.id,
        };
        let mut signature_header = None;
        match sign_request(&params, &last_message) {
            Ok(signature) => {
                url.query_pairs_mut()
                    .append_pair("signature_timestamp", &signature.timestamp.to_string());
                body["signature_prompt"] = json!(last_message);
                signature_header = Some(signature.signature);
            }
            Err(err) => {
                tracing::warn!(error = %err, "signature failed, continuing without it");
            }
        }

        let mut upstream = http
            .post(url)
            .bearer_auth(&user.token)
            .header("Referer", format!("{}/c/{chat_id}", config.upstream.origin()))
            .json(&body);
        for (name, value) in config.upstream_headers() {
            upstream = upstream.header(name, value);
        }
        if let Some(signature) = signature_header {
            upstream = upstream.header("x-signature", signature);
        }

        tracing::debug!(chat_id = %chat_id, model = %request.model, "sending zai request");

        let response = upstream
            .send()
            .await
            .map_err(|err| GatewayError::Transport(format!("send request: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "upstream returned error");
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: "upstream error".to_string(),
            });
        }

        Ok(response)
    }
}

impl Default for ZaiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// The upstream body for one chat request.
///
/// Multimodal content arrays are flattened to their text parts; the upstream
/// always streams, regardless of the client's `stream` flag.
fn build_request_body(
    request: &ChatRequest,
    config: &AppConfig,
    chat_id: &str,
) -> serde_json::Value {
    let model = if request.model.is_empty() {
        config.model.default.as_str()
    } else {
        request.model.as_str()
    };

    let messages: Vec<serde_json::Value> = request
        .messages
        .iter()
        .map(|message| json!({ "role": message.role, "content": message.text() }))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
        "params": {},
        "chat_id": chat_id,
        "id": generate_id(),
    });

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.function.name,
                    "description": tool.function.description,
                    "input_schema": tool.function.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    let mut features = json!({
        "image_generation": false,
        "web_search": false,
        "auto_web_search": false,
    });
    if let Some(thinking) = request.thinking {
        features["thinking"] = json!(thinking);
    }
    body["features"] = features;

    body
}
