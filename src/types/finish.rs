use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Why the model stopped producing text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,

    /// The token limit was reached.
    Length,

    /// Output was withheld by a content filter.
    ContentFilter,

    /// The model handed off to tools.
    ToolCalls,

    /// The backend reported an error while finishing.
    Error,

    /// Some other reason the backend chose to report.
    Other,

    /// A reason this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Token accounting reported in finish parts.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,

    /// Tokens generated for the answer.
    #[serde(default)]
    pub completion_tokens: u64,
}

impl Usage {
    /// Create a new `Usage`.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Prompt plus completion tokens.
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
        }
    }
}

/// Payload of the finish-step (`e:`) and finish-message (`d:`) parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finish {
    /// Why generation stopped.
    pub finish_reason: FinishReason,

    /// Token accounting, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Set on finish-step parts when another step follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_continued: Option<bool>,
}

impl Finish {
    /// A plain `stop` finish without usage.
    pub fn stop() -> Self {
        Self {
            finish_reason: FinishReason::Stop,
            usage: None,
            is_continued: None,
        }
    }

    /// Attach token usage.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}
