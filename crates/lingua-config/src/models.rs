use indexmap::IndexMap;
use serde::Deserialize;

/// Model rewriting applied before requests go upstream
///
/// `target` wins over `mapping`; unmapped names pass through.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    /// Send every request to this model
    #[serde(default)]
    pub target: Option<String>,
    /// Caller model name to upstream model name
    #[serde(default)]
    pub mapping: IndexMap<String, String>,
}
