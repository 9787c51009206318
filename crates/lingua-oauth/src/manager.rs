//! Retry a call across the accounts of a pool

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use lingua_bridge::{BridgeError, Provider};

use crate::account::{AccountSelection, AccountSelector};
use crate::error::PoolError;

/// Accounts tried per call
pub const MAX_RETRY_ATTEMPTS: usize = 3;

/// Runs calls against a pool, moving to another account when one fails
///
/// The account that last succeeded for a provider is tried first; the
/// record is a hint and never blocks selection.
pub struct OAuthPoolManager {
    selector: Arc<dyn AccountSelector>,
    last_successful: DashMap<Provider, String>,
}

impl std::fmt::Debug for OAuthPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthPoolManager")
            .field("last_successful", &self.last_successful)
            .finish_non_exhaustive()
    }
}

/// Errors another account cannot fix
const fn is_account_independent(error: &BridgeError) -> bool {
    matches!(
        error,
        BridgeError::Validation(_) | BridgeError::Adapter(_) | BridgeError::Hook(_)
    )
}

impl OAuthPoolManager {
    pub fn new(selector: Arc<dyn AccountSelector>) -> Self {
        Self {
            selector,
            last_successful: DashMap::new(),
        }
    }

    /// Account that last completed a call for `provider`
    pub fn last_successful(&self, provider: Provider) -> Option<String> {
        self.last_successful.get(&provider).map(|id| id.value().clone())
    }

    async fn pick(&self, provider: Provider, excluded: &HashSet<String>) -> Option<AccountSelection> {
        let preferred = self.last_successful(provider).filter(|id| !excluded.contains(id));
        if let Some(id) = preferred
            && let Some(selection) = self.selector.get(provider, &id).await
        {
            return Some(selection);
        }
        self.selector.select(provider, excluded).await
    }

    /// Run `executor` with up to [`MAX_RETRY_ATTEMPTS`] distinct accounts
    ///
    /// When the pool runs dry, the most recent failure that carried an
    /// upstream status is returned in preference to a generic error.
    pub async fn execute_with_retry<T, F, Fut>(&self, provider: Provider, mut executor: F) -> Result<T, PoolError>
    where
        F: FnMut(AccountSelection) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let mut excluded = HashSet::new();
        let mut failures: Vec<BridgeError> = Vec::new();

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            let Some(selection) = self.pick(provider, &excluded).await else {
                tracing::warn!(%provider, attempt, "no account left to try");
                let with_status = failures.into_iter().rev().find(|e| e.status().is_some());
                return Err(match with_status {
                    Some(error) => PoolError::Upstream(error),
                    None if excluded.is_empty() => PoolError::NoAccounts { provider },
                    None => PoolError::Exhausted {
                        provider,
                        attempts: excluded.len(),
                    },
                });
            };

            let account_id = selection.account.id.clone();
            match executor(selection).await {
                Ok(value) => {
                    self.last_successful.insert(provider, account_id);
                    return Ok(value);
                }
                Err(error) if is_account_independent(&error) => return Err(error.into()),
                Err(error) => {
                    tracing::warn!(
                        %provider,
                        account = %account_id,
                        attempt,
                        status = ?error.status(),
                        error = %error,
                        "account failed, trying another"
                    );
                    excluded.insert(account_id);
                    failures.push(error);
                }
            }
        }

        Err(failures.pop().map_or(
            PoolError::Exhausted {
                provider,
                attempts: MAX_RETRY_ATTEMPTS,
            },
            PoolError::Upstream,
        ))
    }
}
