//! Configuration builder for integration tests

use lingua_config::Config;

/// Builds a TOML document and loads it the way the binary does
pub struct ConfigBuilder {
    provider: String,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    health: bool,
    target: Option<String>,
    mapping: Vec<(String, String)>,
    accounts: Vec<String>,
}

impl ConfigBuilder {
    /// Route every inbound format to `provider` at `base_url`
    pub fn new(provider: &str, base_url: &str) -> Self {
        Self {
            provider: provider.to_owned(),
            base_url: base_url.to_owned(),
            api_key: Some("test-key".to_owned()),
            max_retries: 0,
            health: true,
            target: None,
            mapping: Vec::new(),
            accounts: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_target(mut self, model: &str) -> Self {
        self.target = Some(model.to_owned());
        self
    }

    pub fn with_mapping(mut self, from: &str, to: &str) -> Self {
        self.mapping.push((from.to_owned(), to.to_owned()));
        self
    }

    /// Add a pooled account as a raw `[[accounts]]` body
    pub fn with_account(mut self, id: &str, token: &str, metadata: &str) -> Self {
        self.api_key = None;
        self.accounts
            .push(format!("id = \"{id}\"\naccess_token = \"{token}\"\nmetadata = {metadata}\n"));
        self
    }

    pub fn without_health(mut self) -> Self {
        self.health = false;
        self
    }

    pub fn to_toml(&self) -> String {
        let mut toml = format!(
            "[server]\nlisten_address = \"127.0.0.1:0\"\n\n[server.health]\nenabled = {}\n\n[upstream]\nprovider = \"{}\"\nbase_url = \"{}\"\nmax_retries = {}\n",
            self.health, self.provider, self.base_url, self.max_retries
        );
        if let Some(key) = &self.api_key {
            toml.push_str(&format!("api_key = \"{key}\"\n"));
        }

        toml.push_str("\n[models]\n");
        if let Some(target) = &self.target {
            toml.push_str(&format!("target = \"{target}\"\n"));
        }
        toml.push_str("\n[models.mapping]\n");
        for (from, to) in &self.mapping {
            toml.push_str(&format!("\"{from}\" = \"{to}\"\n"));
        }

        for account in &self.accounts {
            toml.push_str("\n[[accounts]]\n");
            toml.push_str(account);
        }
        toml
    }

    pub fn build(self) -> Config {
        Config::parse(&self.to_toml()).expect("test config must be valid")
    }
}
