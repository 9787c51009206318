//! OAuth accounts and how they are chosen

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use lingua_bridge::Provider;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A signed-in provider account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Provider-specific data (e.g. `chatgpt_account_id`, `project_id`)
    #[serde(default)]
    pub provider_metadata: Map<String, Value>,
}

/// An account ready for use, with a fresh access token
#[derive(Debug, Clone)]
pub struct AccountSelection {
    pub account: Account,
    pub access_token: SecretString,
    /// Selection-time data supplied by the selector
    pub metadata: Map<String, Value>,
}

impl AccountSelection {
    pub fn new(account: Account, access_token: impl Into<String>) -> Self {
        Self {
            account,
            access_token: SecretString::from(access_token.into()),
            metadata: Map::new(),
        }
    }

    /// String value from the selection metadata, then the account's
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .or_else(|| self.account.provider_metadata.get(key))
            .and_then(Value::as_str)
    }
}

/// Source of accounts for the pool manager
///
/// Token refresh and persistence live behind this trait.
#[async_trait]
pub trait AccountSelector: Send + Sync {
    /// Any usable account whose id is not in `excluded`
    async fn select(&self, provider: Provider, excluded: &HashSet<String>) -> Option<AccountSelection>;

    /// A specific account, if it is still usable
    async fn get(&self, provider: Provider, id: &str) -> Option<AccountSelection>;
}

/// Selector over a fixed set of accounts, handed out in insertion order
#[derive(Debug, Default)]
pub struct InMemoryAccountSelector {
    accounts: DashMap<Provider, Vec<AccountSelection>>,
}

impl InMemoryAccountSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, provider: Provider, selection: AccountSelection) {
        self.accounts.entry(provider).or_default().push(selection);
    }

    pub fn remove(&self, provider: Provider, id: &str) {
        if let Some(mut accounts) = self.accounts.get_mut(&provider) {
            accounts.retain(|s| s.account.id != id);
        }
    }
}

#[async_trait]
impl AccountSelector for InMemoryAccountSelector {
    async fn select(&self, provider: Provider, excluded: &HashSet<String>) -> Option<AccountSelection> {
        self.accounts
            .get(&provider)?
            .iter()
            .find(|s| !excluded.contains(&s.account.id))
            .cloned()
    }

    async fn get(&self, provider: Provider, id: &str) -> Option<AccountSelection> {
        self.accounts
            .get(&provider)?
            .iter()
            .find(|s| s.account.id == id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn selection(id: &str) -> AccountSelection {
        AccountSelection::new(
            Account {
                id: id.to_owned(),
                ..Account::default()
            },
            format!("token-{id}"),
        )
    }

    #[tokio::test]
    async fn select_skips_excluded_accounts() {
        let selector = InMemoryAccountSelector::new();
        selector.add(Provider::Codex, selection("a"));
        selector.add(Provider::Codex, selection("b"));

        let excluded = HashSet::from(["a".to_owned()]);
        let picked = selector.select(Provider::Codex, &excluded).await.unwrap();
        assert_eq!(picked.account.id, "b");
        assert!(selector.select(Provider::Antigravity, &HashSet::new()).await.is_none());

        selector.remove(Provider::Codex, "b");
        assert!(selector.select(Provider::Codex, &excluded).await.is_none());
    }

    #[test]
    fn selection_metadata_shadows_account_metadata() {
        let mut picked = selection("a");
        picked.account.provider_metadata.insert("project_id".to_owned(), json!("from-account"));
        assert_eq!(picked.metadata_str("project_id"), Some("from-account"));

        picked.metadata.insert("project_id".to_owned(), json!("fresh"));
        assert_eq!(picked.metadata_str("project_id"), Some("fresh"));
    }
}
