//! Facilitator server configuration.
//!
//! Loads a TOML file with `$VAR`/`${VAR}` environment expansion in string
//! values, then applies `HOST`/`PORT` environment overrides.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//! network = "stellar-testnet"
//! store_path = "s402-facilitator.db"
//! signer_secret_key = "$S402_SIGNER_KEY"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to the configuration file (default: `config.toml`)
//! - `HOST` / `PORT` — Override the bind address
//! - Any variable referenced with `$VAR` inside the file

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use s402::proto::Network;

/// Top-level facilitator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network this facilitator settles on.
    #[serde(default = "default_network")]
    pub network: Network,

    /// Path of the shared replay/discovery database.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Permit falling back to the in-process store when the database is
    /// unavailable. Only for non-production testing; startup fails
    /// otherwise.
    #[serde(default)]
    pub allow_memory_store: bool,

    /// Horizon endpoint override.
    #[serde(default)]
    pub horizon_url: Option<String>,

    /// Soroban RPC endpoint override.
    #[serde(default)]
    pub soroban_rpc_url: Option<String>,

    /// Secret seed for fee sponsorship of native payments. Supports
    /// `$VAR` expansion. When absent, callers pay their own fees.
    #[serde(default)]
    pub signer_secret_key: Option<String>,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            network: default_network(),
            store_path: default_store_path(),
            allow_memory_store: false,
            horizon_url: None,
            soroban_rpc_url: None,
            signer_secret_key: None,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    4021
}

fn default_network() -> Network {
    Network::StellarTestnet
}

fn default_store_path() -> String {
    "s402-facilitator.db".to_owned()
}

impl FacilitatorConfig {
    /// Loads configuration from the path in the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path. A missing file
    /// yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse() {
                config.port = parsed;
            }
        }

        // A signer key left as an unresolved `$VAR` reference means the
        // environment variable was missing; treat it as unset.
        if config
            .signer_secret_key
            .as_deref()
            .is_some_and(|key| key.is_empty() || key.starts_with('$'))
        {
            config.signer_secret_key = None;
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` patterns from the process environment.
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match std::env::var(&var_name) {
            Ok(value) if !var_name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced {
                    result.push('}');
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = FacilitatorConfig::load_from("/nonexistent/config.toml").unwrap();
        assert_eq!(config.port, 4021);
        assert_eq!(config.network, Network::StellarTestnet);
        assert!(!config.allow_memory_store);
        assert!(config.signer_secret_key.is_none());
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            host = "127.0.0.1"
            port = 9000
            network = "stellar"
            store_path = "/var/lib/s402/store.db"
            allow_memory_store = true
            soroban_rpc_url = "https://rpc.example.com"
        "#;
        let config: FacilitatorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.network, Network::Stellar);
        assert!(config.allow_memory_store);
        assert_eq!(
            config.soroban_rpc_url.as_deref(),
            Some("https://rpc.example.com")
        );
    }

    #[test]
    fn expands_environment_references() {
        std::env::set_var("S402_TEST_STORE", "/tmp/replay.db");
        let expanded = expand_env_vars("store_path = \"$S402_TEST_STORE\"");
        assert_eq!(expanded, "store_path = \"/tmp/replay.db\"");

        let untouched = expand_env_vars("key = \"$S402_TEST_UNSET_VARIABLE\"");
        assert_eq!(untouched, "key = \"$S402_TEST_UNSET_VARIABLE\"");
    }
}
