pub mod qwen;
pub mod validate;
pub mod zai;

use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize JSON `null` as the type's default instead of erroring.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ---------------------------------------------------------------------------
// Client-facing request wire shape (OpenAI chat-completion style)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream_options: Option<StreamOptions>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub thinking: Option<bool>,
}

impl ChatRequest {
    /// Whether the client asked for a trailing usage chunk on a stream.
    #[must_use]
    pub fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .is_some_and(|opts| opts.include_usage)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    #[serde(default)]
    pub include_usage: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// Message content is either a plain string or a multimodal part array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<serde_json::Value>,
}

impl Message {
    /// The textual content of this message: the plain string, or all
    /// `type: "text"` parts joined with spaces.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter(|part| part.kind == "text")
                    .map(|part| part.text.as_str())
                    .collect();
                texts.join(" ")
            }
            None => String::new(),
        }
    }
}

/// All message text joined with spaces, the tokenizer's prompt input.
#[must_use]
pub fn extract_message_text(messages: &[Message]) -> String {
    let texts: Vec<String> = messages
        .iter()
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .collect();
    texts.join(" ")
}

/// Text of the most recent user message, the signer's prompt input.
#[must_use]
pub fn last_user_message_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(Message::text)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Client-facing response wire shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ResponseMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ResponseMessage>,
    // serialized as null when absent, matching the wire contract
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

pub const FINISH_STOP: &str = "stop";
pub const FINISH_TOOL_CALLS: &str = "tool_calls";
pub const OBJECT_CHUNK: &str = "chat.completion.chunk";
pub const OBJECT_COMPLETION: &str = "chat.completion";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_minimal_body() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"model":"GLM-4-6-API-V1","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(req.model, "GLM-4-6-API-V1");
        assert!(!req.stream);
        assert!(req.tools.is_empty());
        assert_eq!(req.messages[0].text(), "hi");
    }

    #[test]
    fn request_missing_messages_is_rejected() {
        let result: Result<ChatRequest, _> = serde_json::from_str(r#"{"model":"m"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn multimodal_text_extraction_joins_parts() {
        let message: Message = serde_json::from_str(
            r#"{"role":"user","content":[
                {"type":"text","text":"describe"},
                {"type":"image_url","image_url":{"url":"data:image/png;base64,xx"}},
                {"type":"text","text":"this"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(message.text(), "describe this");
    }

    #[test]
    fn null_content_extracts_empty() {
        let message: Message =
            serde_json::from_str(r#"{"role":"assistant","content":null}"#).unwrap();
        assert_eq!(message.text(), "");
    }

    #[test]
    fn last_user_message_skips_assistant_turns() {
        let messages: Vec<Message> = serde_json::from_str(
            r#"[
                {"role":"user","content":"first"},
                {"role":"assistant","content":"answer"},
                {"role":"user","content":"second"}
            ]"#,
        )
        .unwrap();
        assert_eq!(last_user_message_text(&messages), "second");
        assert_eq!(extract_message_text(&messages), "first answer second");
    }

    #[test]
    fn chunk_serializes_finish_reason_null() {
        let chunk = ChatResponse {
            id: "chatcmpl-1".into(),
            object: OBJECT_CHUNK.into(),
            created: 1,
            model: "m".into(),
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(ResponseMessage {
                    role: "assistant".into(),
                    content: "hi".into(),
                    ..ResponseMessage::default()
                }),
                finish_reason: None,
            }],
            usage: None,
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"finish_reason\":null"));
        assert!(!json.contains("reasoning_content"));
        assert!(!json.contains("\"message\""));
    }

    #[test]
    fn tool_call_round_trips() {
        let call = ToolCall {
            id: "call_1".into(),
            kind: "function".into(),
            function: FunctionCall {
                name: "get_weather".into(),
                arguments: r#"{"city":"SF"}"#.into(),
            },
        };
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains("\"type\":\"function\""));
        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }
}
