use lingua_bridge::{BridgeError, Provider};
use thiserror::Error;

/// Errors from running a call against an account pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool holds no usable account for the provider
    #[error("no {provider} accounts available")]
    NoAccounts { provider: Provider },

    /// Every attempted account failed without an upstream status to report
    #[error("all {provider} accounts failed after {attempts} attempts")]
    Exhausted { provider: Provider, attempts: usize },

    /// The call itself failed
    #[error(transparent)]
    Upstream(#[from] BridgeError),
}

impl PoolError {
    /// HTTP status reported by the upstream, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream(e) => e.status(),
            Self::NoAccounts { .. } | Self::Exhausted { .. } => None,
        }
    }
}
