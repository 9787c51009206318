use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value};

/// A signed-in account for an OAuth provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Current access token
    pub access_token: SecretString,
    /// Provider-specific values (e.g. `chatgpt_account_id`, `project_id`)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
