use serde::Deserialize;

use super::{null_default, ToolCall, Usage};

/// qwen wire response, shared by stream chunks and the non-stream body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QwenResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<QwenChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QwenChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<QwenMessage>,
    #[serde(default)]
    pub delta: Option<QwenMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QwenMessage {
    #[serde(default, deserialize_with = "null_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_default")]
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_chunk() {
        let chunk: QwenResponse = serde_json::from_str(
            r#"{"id":"q-1","object":"chat.completion.chunk","created":10,
                "choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.id, "q-1");
        let delta = chunk.choices[0].delta.as_ref().unwrap();
        assert_eq!(delta.content, "Hi");
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn parses_finish_only_chunk() {
        let chunk: QwenResponse =
            serde_json::from_str(r#"{"choices":[{"index":0,"finish_reason":"stop"}]}"#).unwrap();
        assert!(chunk.choices[0].delta.is_none());
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn null_content_defaults_to_empty() {
        let chunk = serde_json::from_str::<QwenResponse>(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":null,
                "tool_calls":[{"id":"c1","type":"function","function":{"name":"f","arguments":"{}"}}]}}]}"#,
        );
        // content: null must not fail the whole decode
        let chunk = chunk.unwrap();
        let message = chunk.choices[0].message.as_ref().unwrap();
        assert_eq!(message.content, "");
        assert_eq!(message.tool_calls.len(), 1);
    }
}
