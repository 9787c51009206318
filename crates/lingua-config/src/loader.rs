use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;
use crate::upstream::MAX_RETRIES_LIMIT;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;
        Self::parse(&raw)
    }

    /// Expand, deserialize and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_upstream()?;
        self.validate_models()?;
        self.validate_accounts()?;
        Ok(())
    }

    fn validate_upstream(&self) -> anyhow::Result<()> {
        let upstream = &self.upstream;

        if upstream.max_retries > MAX_RETRIES_LIMIT {
            anyhow::bail!(
                "upstream.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                upstream.max_retries
            );
        }

        if upstream.timeout_duration()?.is_zero() {
            anyhow::bail!("upstream.timeout must be greater than 0");
        }

        if let Some(name) = &upstream.auth_header_name
            && http_header_name_is_invalid(name)
        {
            anyhow::bail!("upstream.auth_header_name '{name}' is not a valid header name");
        }

        for name in upstream.headers.keys() {
            if http_header_name_is_invalid(name) {
                anyhow::bail!("upstream header '{name}' is not a valid header name");
            }
        }

        Ok(())
    }

    fn validate_models(&self) -> anyhow::Result<()> {
        if self.models.target.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("models.target must not be empty");
        }

        for (from, to) in &self.models.mapping {
            if from.is_empty() {
                anyhow::bail!("models.mapping keys must not be empty");
            }
            if to.is_empty() {
                anyhow::bail!("models.mapping entry '{from}' maps to an empty model name");
            }
        }

        Ok(())
    }

    fn validate_accounts(&self) -> anyhow::Result<()> {
        let provider = self.upstream.provider;

        if !provider.uses_oauth() {
            if !self.accounts.is_empty() {
                anyhow::bail!("accounts are only used by OAuth providers, not '{provider}'");
            }
            return Ok(());
        }

        if self.accounts.is_empty() {
            anyhow::bail!("provider '{provider}' requires at least one [[accounts]] entry");
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.id.is_empty() {
                anyhow::bail!("account id must not be empty");
            }
            if !seen.insert(account.id.as_str()) {
                anyhow::bail!("duplicate account id '{}'", account.id);
            }
            if account.access_token.expose_secret().is_empty() {
                anyhow::bail!("account '{}' has an empty access_token", account.id);
            }
        }

        Ok(())
    }
}

/// Header names are RFC 7230 tokens
fn http_header_name_is_invalid(name: &str) -> bool {
    name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}
