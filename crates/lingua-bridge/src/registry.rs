//! Provider names and their adapters

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::{
    Adapter, AnthropicAdapter, AntigravityAdapter, Dialect, GeminiAdapter, OpenAiAdapter, ResponsesAdapter,
    ResponsesFlavor,
};

/// Wire formats the bridge can speak
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Provider {
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    #[strum(to_string = "openai_responses", serialize = "responses")]
    #[serde(rename = "openai_responses", alias = "responses")]
    OpenAiResponses,
    Anthropic,
    #[strum(serialize = "deepseek")]
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[strum(serialize = "minimax")]
    #[serde(rename = "minimax")]
    MiniMax,
    Zhipu,
    Gemini,
    Antigravity,
    Codex,
}

impl Provider {
    /// Fresh adapter for this provider
    pub fn adapter(self) -> Arc<dyn Adapter> {
        match self {
            Self::OpenAi => Arc::new(OpenAiAdapter::new(Dialect::OpenAi)),
            Self::DeepSeek => Arc::new(OpenAiAdapter::new(Dialect::DeepSeek)),
            Self::MiniMax => Arc::new(OpenAiAdapter::new(Dialect::MiniMax)),
            Self::Zhipu => Arc::new(OpenAiAdapter::new(Dialect::Zhipu)),
            Self::OpenAiResponses => Arc::new(ResponsesAdapter::new(ResponsesFlavor::Standard)),
            Self::Codex => Arc::new(ResponsesAdapter::codex()),
            Self::Anthropic => Arc::new(AnthropicAdapter::new()),
            Self::Gemini => Arc::new(GeminiAdapter::new()),
            Self::Antigravity => Arc::new(AntigravityAdapter::new()),
        }
    }

    /// Whether requests are authorized with OAuth accounts instead of API keys
    pub const fn uses_oauth(self) -> bool {
        matches!(self, Self::Antigravity | Self::Codex)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_parse() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!("DeepSeek".parse::<Provider>().unwrap(), Provider::DeepSeek);
        assert_eq!("responses".parse::<Provider>().unwrap(), Provider::OpenAiResponses);
        assert_eq!(Provider::MiniMax.to_string(), "minimax");
        assert!("bard".parse::<Provider>().is_err());
    }

    #[test]
    fn adapters_report_their_provider() {
        for provider in Provider::iter() {
            assert_eq!(provider.adapter().info().name, provider.as_ref());
        }
    }
}
