use serde::Deserialize;

/// One framed event from the zai event stream.
///
/// The payload of interest lives under `data`; frames without it (status
/// pings, routing notices) normalize to an empty event and are skipped by the
/// phase normalizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZaiEvent {
    #[serde(default)]
    pub data: Option<ZaiEventData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZaiEventData {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub delta_content: String,
    #[serde(default)]
    pub edit_content: String,
    #[serde(default)]
    pub edit_index: Option<i64>,
    #[serde(default)]
    pub done: bool,
}

impl ZaiEventData {
    /// The fragment carried by this event.
    ///
    /// `delta_content` wins; `edit_content` is a positional patch over earlier
    /// text but is treated as one more additive fragment here.
    #[must_use]
    pub fn fragment(&self) -> &str {
        if self.delta_content.is_empty() {
            &self.edit_content
        } else {
            &self.delta_content
        }
    }
}
