//! Phase-tagged delta normalization for the zai upstream.
//!
//! Upstream content arrives as phase-tagged fragments wrapped in pseudo-HTML
//! markup, with tool calls encoded as JSON inside `<glm_block>` spans. The
//! markup is not well-formed and tags can be split across events, so the
//! transforms are an ordered list of regex substitutions over each fragment,
//! never a markup parse. One item of phase memory carries across events: a
//! `tool_call` block interrupted mid-stream resumes under phase `other`.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::config::ThinkMode;
use crate::protocol::zai::ZaiEventData;

/// Upstream-declared category of a content fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    ToolCall,
    Answer,
    Other,
}

impl Phase {
    /// An empty or unknown wire phase is `Other`.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "thinking" => Phase::Thinking,
            "tool_call" => Phase::ToolCall,
            "answer" => Phase::Answer,
            _ => Phase::Other,
        }
    }
}

/// One normalized output fragment; exactly one payload by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDelta {
    /// Plain assistant content.
    Content(String),
    /// Reasoning surfaced separately (think mode `reasoning` only).
    Reasoning(String),
    /// A piece of an embedded tool-call block, destined for the assembler.
    ToolCallFragment(String),
}

static TOOL_BLOCK_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\n*<glm_block[^>]*>\{"type": "mcp", "data": \{"metadata": \{"#).unwrap()
});
static TOOL_RESULT_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[}"], "result": "".*</glm_block>"#).unwrap());
static TOOL_RESUME_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"null, "display_result": "".*</glm_block>"#).unwrap());
static SUMMARY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n*<summary>.*?</summary>\n*").unwrap());
static DETAILS_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<details[^>]*>\n*").unwrap());
static DETAILS_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n*</details>").unwrap());
static QUOTE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n>\s?").unwrap());
static REASONING_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<reasoning>\n*").unwrap());
static REASONING_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n*</reasoning>").unwrap());
static REASONING_CLOSE_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</reasoning>\n*").unwrap());

/// Per-request stateful transformer from raw zai events to normalized deltas.
pub struct PhaseNormalizer {
    previous_phase: Phase,
    think_mode: ThinkMode,
}

impl PhaseNormalizer {
    #[must_use]
    pub fn new(think_mode: ThinkMode) -> Self {
        Self {
            previous_phase: Phase::Thinking,
            think_mode,
        }
    }

    /// The phase the previous visible event resolved to.
    #[must_use]
    pub fn previous_phase(&self) -> Phase {
        self.previous_phase
    }

    /// Transform one upstream event into at most one normalized delta.
    ///
    /// Events carrying no content at all are invisible: they emit nothing and
    /// leave the phase memory untouched. Every visible event updates
    /// `previous_phase` to its effective phase, even when the rewrites empty
    /// its content.
    pub fn apply(&mut self, event: &ZaiEventData) -> Option<NormalizedDelta> {
        let mut phase = Phase::from_wire(&event.phase);
        let fragment = event.fragment();
        if fragment.is_empty() {
            return None;
        }
        let mut content = fragment.to_string();

        if phase == Phase::ToolCall {
            content = TOOL_BLOCK_OPEN.replace_all(&content, "{").into_owned();
            content = TOOL_RESULT_TAIL.replace_all(&content, "").into_owned();
        } else if phase == Phase::Other
            && self.previous_phase == Phase::ToolCall
            && content.contains("glm_block")
        {
            // Cross-chunk resumption: the tail of an interrupted tool-call
            // block arrives tagged as `other`.
            phase = Phase::ToolCall;
            content = TOOL_RESUME_TAIL.replace_all(&content, "\"}").into_owned();
        }

        if phase == Phase::Thinking || (phase == Phase::Answer && content.contains("summary>")) {
            content = content
                .replace("</thinking>", "")
                .replace("<Full>", "")
                .replace("</Full>", "");

            if phase == Phase::Thinking {
                content = SUMMARY_BLOCK.replace_all(&content, "\n\n").into_owned();
            }

            content = DETAILS_OPEN
                .replace_all(&content, "<reasoning>\n\n")
                .into_owned();
            content = DETAILS_CLOSE
                .replace_all(&content, "\n\n</reasoning>")
                .into_owned();

            match self.think_mode {
                ThinkMode::Reasoning => {
                    if phase == Phase::Thinking {
                        content = QUOTE_PREFIX.replace_all(&content, "\n").into_owned();
                    }
                    content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                    content = REASONING_OPEN.replace_all(&content, "").into_owned();
                    content = REASONING_CLOSE.replace_all(&content, "").into_owned();
                }
                ThinkMode::Think => {
                    if phase == Phase::Thinking {
                        content = QUOTE_PREFIX.replace_all(&content, "\n").into_owned();
                    }
                    content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                    content = content
                        .replace("<reasoning>", "<think>")
                        .replace("</reasoning>", "</think>");
                }
                ThinkMode::Strip => {
                    content = SUMMARY_BLOCK.replace_all(&content, "").into_owned();
                    content = REASONING_OPEN.replace_all(&content, "").into_owned();
                    content = content.replace("</reasoning>", "");
                }
                ThinkMode::Details => {
                    content = REASONING_CLOSE_SPACING
                        .replace_all(&content, "</reasoning>\n\n")
                        .into_owned();
                }
            }
        }

        self.previous_phase = phase;

        if phase == Phase::ToolCall {
            return Some(NormalizedDelta::ToolCallFragment(content));
        }
        if content.is_empty() {
            return None;
        }
        if phase == Phase::Thinking && self.think_mode == ThinkMode::Reasoning {
            return Some(NormalizedDelta::Reasoning(content));
        }
        Some(NormalizedDelta::Content(content))
    }
}
