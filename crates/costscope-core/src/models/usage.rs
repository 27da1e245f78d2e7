//! Token usage events.

use serde::{Deserialize, Serialize};

/// Where a usage event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageSource {
    /// Local CLI usage logs (JSONL transcripts, SQL log)
    Cli,
    /// Browser extension API intercepts
    Browser,
}

impl UsageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageSource::Cli => "cli",
            UsageSource::Browser => "browser",
        }
    }
}

/// One model call with its token counts and derived cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub tool: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    pub cost_usd: f64,
    pub prompt_text: Option<String>,
    pub response_text: Option<String>,
    pub source: UsageSource,
    /// Project or session the call belongs to, when known
    pub project: Option<String>,
}

impl UsageEvent {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_tokens
            + self.cache_read_tokens
    }
}
