#![allow(clippy::must_use_candidate)]

pub mod accounts;
mod env;
mod loader;
pub mod models;
pub mod server;
pub mod telemetry;
pub mod upstream;

use serde::Deserialize;

pub use accounts::*;
pub use models::*;
pub use server::*;
pub use telemetry::*;
pub use upstream::*;

/// Top-level Lingua configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream provider configuration
    pub upstream: UpstreamConfig,
    /// Model rewriting
    #[serde(default)]
    pub models: ModelsConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Account pool for OAuth providers
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}
