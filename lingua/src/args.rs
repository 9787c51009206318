use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Lingua LLM wire-format bridge
#[derive(Debug, Parser)]
#[command(
    name = "lingua",
    about = "Serve OpenAI, Anthropic and Responses clients from any supported LLM provider"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lingua.toml", env = "LINGUA_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "LINGUA_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Override the configured log filter (e.g. "debug", "lingua_bridge=trace")
    #[arg(long, env = "LINGUA_LOG")]
    pub log_filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_config() {
        let args = Args::try_parse_from(["lingua"]).unwrap();
        assert_eq!(args.config, PathBuf::from("lingua.toml"));
        assert!(args.listen.is_none());
    }

    #[test]
    fn listen_override_parses() {
        let args = Args::try_parse_from(["lingua", "-c", "/etc/lingua.toml", "--listen", "0.0.0.0:9090"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/lingua.toml"));
        assert_eq!(args.listen.unwrap().port(), 9090);
    }
}
