//! The configured provider, seen from one inbound format

use std::collections::HashMap;
use std::sync::Arc;

use lingua_bridge::{Bridge, BridgeConfig, FrameStream, Provider, TracingHooks};
use lingua_config::Config;
use lingua_oauth::{
    Account, AccountSelection, AntigravityTranslator, CodexTranslator, InMemoryAccountSelector, OAuthPoolManager,
    TranslatorOptions,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::ApiError;

/// Caller-facing formats served by the HTTP routes
pub const INBOUND_FORMATS: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::OpenAiResponses];

/// How calls in one inbound format reach the upstream
#[derive(Debug)]
pub enum Upstream {
    /// API-key provider behind a single bridge
    Direct(Bridge),
    Codex(CodexTranslator),
    Antigravity(AntigravityTranslator),
}

impl Upstream {
    pub async fn chat(&self, wire: Value) -> Result<Value, ApiError> {
        match self {
            Self::Direct(bridge) => Ok(bridge.chat(wire).await?),
            Self::Codex(translator) => Ok(translator.chat(wire).await?),
            Self::Antigravity(translator) => Ok(translator.chat(wire).await?),
        }
    }

    pub async fn chat_stream(&self, wire: Value) -> Result<FrameStream, ApiError> {
        match self {
            Self::Direct(bridge) => Ok(bridge.chat_stream(wire).await?),
            Self::Codex(translator) => Ok(translator.chat_stream(wire).await?),
            Self::Antigravity(translator) => Ok(translator.chat_stream(wire).await?),
        }
    }

    /// Model ids the upstream advertises; account pools are not asked
    pub async fn models(&self) -> Result<Vec<String>, ApiError> {
        match self {
            Self::Direct(bridge) => Ok(model_ids(&bridge.list_models().await?)),
            Self::Codex(_) | Self::Antigravity(_) => Ok(Vec::new()),
        }
    }
}

/// Ids from a `data[].id` listing, or Gemini's `models[].name`
fn model_ids(listing: &Value) -> Vec<String> {
    listing
        .get("data")
        .or_else(|| listing.get("models"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("id").or_else(|| entry.get("name")).and_then(Value::as_str))
        .map(|id| id.trim_start_matches("models/").to_owned())
        .collect()
}

/// Build one [`Upstream`] per inbound format
pub fn build_upstreams(config: &Config) -> HashMap<Provider, Upstream> {
    let provider = config.upstream.provider;

    if provider.uses_oauth() {
        let manager = Arc::new(OAuthPoolManager::new(Arc::new(account_pool(config))));
        let options = translator_options(config);
        return INBOUND_FORMATS
            .into_iter()
            .map(|inbound| {
                let options = TranslatorOptions {
                    hooks: Arc::new(TracingHooks::new(format!("{inbound}->{provider}"))),
                    ..options.clone()
                };
                let upstream = if provider == Provider::Codex {
                    Upstream::Codex(CodexTranslator::new(manager.clone(), inbound, options))
                } else {
                    Upstream::Antigravity(AntigravityTranslator::new(manager.clone(), inbound, options))
                };
                (inbound, upstream)
            })
            .collect();
    }

    let bridge_config = bridge_config(config);
    INBOUND_FORMATS
        .into_iter()
        .map(|inbound| {
            let mut builder = Bridge::builder(inbound.adapter(), provider.adapter(), bridge_config.clone())
                .hooks(Arc::new(TracingHooks::new(format!("{inbound}->{provider}"))));
            if let Some(target) = &config.models.target {
                builder = builder.target_model(target.clone());
            }
            if !config.models.mapping.is_empty() {
                builder = builder.model_mapping(model_mapping(config));
            }

            let bridge = builder.build();
            let report = bridge.check_compatibility();
            for issue in &report.issues {
                tracing::warn!(%inbound, %provider, issue = %issue, "format mismatch");
            }
            for warning in &report.warnings {
                tracing::debug!(%inbound, %provider, warning = %warning, "format degradation");
            }

            (inbound, Upstream::Direct(bridge))
        })
        .collect()
}

/// Configured base URL without a trailing slash
fn base_url(config: &Config) -> Option<String> {
    config
        .upstream
        .base_url
        .as_ref()
        .map(|url| url.as_str().trim_end_matches('/').to_owned())
}

fn model_mapping(config: &Config) -> HashMap<String, String> {
    config
        .models
        .mapping
        .iter()
        .map(|(from, to)| (from.clone(), to.clone()))
        .collect()
}

fn bridge_config(config: &Config) -> BridgeConfig {
    let upstream = &config.upstream;
    BridgeConfig {
        api_key: upstream
            .api_key
            .clone()
            .unwrap_or_else(|| SecretString::from(String::new())),
        base_url: base_url(config),
        chat_path: upstream.chat_path.clone(),
        models_path: upstream.models_path.clone(),
        // Validated at load time
        timeout: upstream.timeout_duration().unwrap_or(lingua_bridge::bridge::DEFAULT_TIMEOUT),
        max_retries: upstream.max_retries,
        headers: upstream
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        auth_header_name: upstream.auth_header_name.clone(),
        auth_header_prefix: upstream.auth_header_prefix.clone(),
    }
}

fn translator_options(config: &Config) -> TranslatorOptions {
    TranslatorOptions {
        base_url: base_url(config),
        timeout: config
            .upstream
            .timeout_duration()
            .unwrap_or(lingua_bridge::bridge::DEFAULT_TIMEOUT),
        max_retries: config.upstream.max_retries,
        target_model: config.models.target.clone(),
        model_mapping: model_mapping(config),
        ..TranslatorOptions::default()
    }
}

fn account_pool(config: &Config) -> InMemoryAccountSelector {
    let provider = config.upstream.provider;
    let selector = InMemoryAccountSelector::new();
    for entry in &config.accounts {
        let account = Account {
            id: entry.id.clone(),
            email: entry.email.clone(),
            provider_metadata: entry.metadata.clone(),
        };
        selector.add(
            provider,
            AccountSelection::new(account, entry.access_token.expose_secret()),
        );
    }
    tracing::info!(%provider, accounts = config.accounts.len(), "account pool ready");
    selector
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn model_ids_read_both_listing_shapes() {
        let anthropic = json!({"data": [{"type": "model", "id": "claude-haiku-4-5-20251001"}], "has_more": false});
        assert_eq!(model_ids(&anthropic), ["claude-haiku-4-5-20251001"]);

        let gemini = json!({"models": [{"name": "models/gemini-2.5-pro"}, {"name": "models/gemini-2.5-flash"}]});
        assert_eq!(model_ids(&gemini), ["gemini-2.5-pro", "gemini-2.5-flash"]);

        assert!(model_ids(&json!({"error": "nope"})).is_empty());
    }
}
