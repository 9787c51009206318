use std::time::Duration;

use indexmap::IndexMap;
use lingua_bridge::Provider;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Upper bound for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// The provider every inbound request is bridged to
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Provider wire format (e.g. "anthropic", "openai", "gemini")
    pub provider: Provider,
    /// API key for authentication; OAuth providers use `[[accounts]]`
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Chat path override, may contain `{model}`
    #[serde(default)]
    pub chat_path: Option<String>,
    /// Models path override
    #[serde(default)]
    pub models_path: Option<String>,
    /// Request timeout (e.g. "60s", "2m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Retries for failed upstream calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Header carrying the credential, replacing the provider default
    #[serde(default)]
    pub auth_header_name: Option<String>,
    /// Prefix before the credential (e.g. "Bearer ")
    #[serde(default)]
    pub auth_header_prefix: Option<String>,
    /// Extra headers sent with every upstream request
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl UpstreamConfig {
    /// Parsed request timeout
    pub fn timeout_duration(&self) -> anyhow::Result<Duration> {
        duration_str::parse(&self.timeout)
            .map_err(|e| anyhow::anyhow!("invalid upstream.timeout '{}': {e}", self.timeout))
    }
}

fn default_timeout() -> String {
    "60s".to_string()
}

const fn default_max_retries() -> u32 {
    3
}
