//! Account pools for OAuth-backed providers
//!
//! Calls to subscription backends (`ChatGPT` Codex, Antigravity) run against
//! a pool of signed-in accounts. A failing account is set aside for the call
//! and the next one is tried.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod account;
pub mod error;
pub mod manager;
pub mod translator;

pub use account::{Account, AccountSelection, AccountSelector, InMemoryAccountSelector};
pub use error::PoolError;
pub use manager::{MAX_RETRY_ATTEMPTS, OAuthPoolManager};
pub use translator::{AntigravityTranslator, CodexTranslator, TranslatorOptions};
