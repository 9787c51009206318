//! Bridges to OAuth-backed providers, one per attempted account

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lingua_bridge::adapter::AntigravityAdapter;
use lingua_bridge::bridge::DEFAULT_TIMEOUT;
use lingua_bridge::{Adapter, Bridge, BridgeConfig, BridgeHooks, FrameStream, NoopHooks, Provider, Transport};
use serde_json::Value;

use crate::account::AccountSelection;
use crate::error::PoolError;
use crate::manager::OAuthPoolManager;

/// Header carrying the `ChatGPT` workspace of a Codex account
pub const CHATGPT_ACCOUNT_HEADER: &str = "chatgpt-account-id";

/// Account metadata key holding the `ChatGPT` account id
pub const CHATGPT_ACCOUNT_KEY: &str = "chatgpt_account_id";

/// Account metadata key holding the Cloud Code project
pub const PROJECT_ID_KEY: &str = "project_id";

/// Settings shared by the translators
#[derive(Clone)]
pub struct TranslatorOptions {
    /// Overrides the provider's base URL
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Upstream retries per account
    pub max_retries: u32,
    pub target_model: Option<String>,
    /// Caller model name to upstream model name
    pub model_mapping: HashMap<String, String>,
    pub hooks: Arc<dyn BridgeHooks>,
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            target_model: None,
            model_mapping: HashMap::new(),
            hooks: Arc::new(NoopHooks),
            transport: None,
        }
    }
}

impl std::fmt::Debug for TranslatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorOptions")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("target_model", &self.target_model)
            .field("model_mapping", &self.model_mapping)
            .finish_non_exhaustive()
    }
}

impl TranslatorOptions {
    fn bridge(
        &self,
        inbound: Arc<dyn Adapter>,
        outbound: Arc<dyn Adapter>,
        selection: &AccountSelection,
        headers: Vec<(String, String)>,
    ) -> Bridge {
        let config = BridgeConfig {
            api_key: selection.access_token.clone(),
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            max_retries: self.max_retries,
            headers,
            ..BridgeConfig::default()
        };
        let mut builder = Bridge::builder(inbound, outbound, config).hooks(self.hooks.clone());
        if let Some(model) = &self.target_model {
            builder = builder.target_model(model.clone());
        }
        if !self.model_mapping.is_empty() {
            builder = builder.model_mapping(self.model_mapping.clone());
        }
        if let Some(transport) = &self.transport {
            builder = builder.transport(transport.clone());
        }
        builder.build()
    }
}

/// Callers in any format, served by the `ChatGPT` Codex backend
///
/// Codex only streams, so non-streaming calls are folded from the stream.
#[derive(Debug)]
pub struct CodexTranslator {
    manager: Arc<OAuthPoolManager>,
    inbound: Provider,
    options: TranslatorOptions,
}

impl CodexTranslator {
    pub const fn new(manager: Arc<OAuthPoolManager>, inbound: Provider, options: TranslatorOptions) -> Self {
        Self {
            manager,
            inbound,
            options,
        }
    }

    fn bridge(&self, selection: &AccountSelection) -> Bridge {
        let headers = selection
            .metadata_str(CHATGPT_ACCOUNT_KEY)
            .map(|id| vec![(CHATGPT_ACCOUNT_HEADER.to_owned(), id.to_owned())])
            .unwrap_or_default();
        self.options
            .bridge(self.inbound.adapter(), Provider::Codex.adapter(), selection, headers)
    }

    pub async fn chat(&self, wire: Value) -> Result<Value, PoolError> {
        self.manager
            .execute_with_retry(Provider::Codex, |selection| {
                let bridge = self.bridge(&selection);
                let wire = wire.clone();
                async move { bridge.chat_aggregated(wire).await }
            })
            .await
    }

    /// Accounts are only switched until the upstream stream opens
    pub async fn chat_stream(&self, wire: Value) -> Result<FrameStream, PoolError> {
        self.manager
            .execute_with_retry(Provider::Codex, |selection| {
                let bridge = self.bridge(&selection);
                let wire = wire.clone();
                async move { bridge.chat_stream(wire).await }
            })
            .await
    }
}

/// Callers in any format, served by Antigravity
#[derive(Debug)]
pub struct AntigravityTranslator {
    manager: Arc<OAuthPoolManager>,
    inbound: Provider,
    options: TranslatorOptions,
}

impl AntigravityTranslator {
    pub const fn new(manager: Arc<OAuthPoolManager>, inbound: Provider, options: TranslatorOptions) -> Self {
        Self {
            manager,
            inbound,
            options,
        }
    }

    fn bridge(&self, selection: &AccountSelection) -> Bridge {
        let outbound: Arc<dyn Adapter> = match selection.metadata_str(PROJECT_ID_KEY) {
            Some(project) => Arc::new(AntigravityAdapter::with_project(project)),
            None => {
                tracing::debug!(account = %selection.account.id, "account has no project id");
                Arc::new(AntigravityAdapter::new())
            }
        };
        self.options
            .bridge(self.inbound.adapter(), outbound, selection, Vec::new())
    }

    pub async fn chat(&self, wire: Value) -> Result<Value, PoolError> {
        self.manager
            .execute_with_retry(Provider::Antigravity, |selection| {
                let bridge = self.bridge(&selection);
                let wire = wire.clone();
                async move { bridge.chat(wire).await }
            })
            .await
    }

    pub async fn chat_stream(&self, wire: Value) -> Result<FrameStream, PoolError> {
        self.manager
            .execute_with_retry(Provider::Antigravity, |selection| {
                let bridge = self.bridge(&selection);
                let wire = wire.clone();
                async move { bridge.chat_stream(wire).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::account::{Account, InMemoryAccountSelector};

    fn account(id: &str, key: &str, value: &str) -> AccountSelection {
        let mut account = Account {
            id: id.to_owned(),
            ..Account::default()
        };
        account.provider_metadata.insert(key.to_owned(), json!(value));
        AccountSelection::new(account, format!("token-{id}"))
    }

    fn options(server: &MockServer) -> TranslatorOptions {
        TranslatorOptions {
            base_url: Some(server.uri()),
            ..TranslatorOptions::default()
        }
    }

    const CODEX_STREAM: &str = concat!(
        "event: response.output_text.delta\n",
        "data: {\"type\":\"response.output_text.delta\",\"item_id\":\"msg_1\",\"output_index\":0,\"content_index\":0,\"delta\":\"pong\"}\n\n",
        "event: response.completed\n",
        "data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"model\":\"gpt-5-codex\",\"status\":\"completed\",\"output\":[],\"usage\":{\"input_tokens\":3,\"output_tokens\":1,\"total_tokens\":4}}}\n\n",
    );

    #[tokio::test]
    async fn codex_switches_account_after_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer token-stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "expired"}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer token-fresh"))
            .and(header(CHATGPT_ACCOUNT_HEADER, "ws-2"))
            .and(body_partial_json(json!({"stream": true, "store": false})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(CODEX_STREAM, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let selector = InMemoryAccountSelector::new();
        selector.add(Provider::Codex, account("stale", CHATGPT_ACCOUNT_KEY, "ws-1"));
        selector.add(Provider::Codex, account("fresh", CHATGPT_ACCOUNT_KEY, "ws-2"));
        let manager = Arc::new(OAuthPoolManager::new(Arc::new(selector)));
        let translator = CodexTranslator::new(manager.clone(), Provider::OpenAi, options(&server));

        let response = translator
            .chat(json!({"model": "gpt-5-codex", "messages": [{"role": "user", "content": "ping"}]}))
            .await
            .unwrap();

        assert_eq!(response["choices"][0]["message"]["content"], "pong");
        assert_eq!(manager.last_successful(Provider::Codex).as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn antigravity_uses_account_project() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1internal:streamGenerateContent"))
            .and(body_partial_json(json!({"project": "proj-7", "requestType": "agent"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"response\":{\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"hi\"}]},\"finishReason\":\"STOP\"}]}}\n\n",
                "text/event-stream",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let selector = InMemoryAccountSelector::new();
        selector.add(Provider::Antigravity, account("g1", PROJECT_ID_KEY, "proj-7"));
        let translator = AntigravityTranslator::new(
            Arc::new(OAuthPoolManager::new(Arc::new(selector))),
            Provider::Anthropic,
            options(&server),
        );

        let frames: Vec<_> = translator
            .chat_stream(json!({
                "model": "gemini-3-pro",
                "max_tokens": 64,
                "stream": true,
                "messages": [{"role": "user", "content": "hello"}]
            }))
            .await
            .unwrap()
            .collect()
            .await;

        let names: Vec<_> = frames
            .iter()
            .filter_map(|f| f.as_ref().ok().and_then(|f| f.event.clone()))
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("message_start"));
        assert_eq!(names.last().map(String::as_str), Some("message_stop"));
    }
}
