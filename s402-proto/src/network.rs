//! Stellar network identification.
//!
//! Each supported network tag maps to a network passphrase, a Horizon
//! transaction-history endpoint, and a Soroban RPC endpoint.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Network passphrase for Stellar mainnet.
pub const STELLAR_MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Network passphrase for Stellar testnet.
pub const STELLAR_TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Approximate ledger close cadence, used to convert timeouts into ledger
/// sequence windows.
pub const LEDGER_CLOSE_SECONDS: u64 = 5;

/// A supported Stellar network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// Stellar mainnet (`"stellar"`).
    #[serde(rename = "stellar")]
    Stellar,

    /// Stellar testnet (`"stellar-testnet"`).
    #[serde(rename = "stellar-testnet")]
    StellarTestnet,
}

impl Network {
    /// The wire tag for this network.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stellar => "stellar",
            Self::StellarTestnet => "stellar-testnet",
        }
    }

    /// The network passphrase mixed into transaction hashes.
    #[must_use]
    pub const fn passphrase(self) -> &'static str {
        match self {
            Self::Stellar => STELLAR_MAINNET_PASSPHRASE,
            Self::StellarTestnet => STELLAR_TESTNET_PASSPHRASE,
        }
    }

    /// Default Horizon endpoint for account and history lookups.
    #[must_use]
    pub const fn horizon_url(self) -> &'static str {
        match self {
            Self::Stellar => "https://horizon.stellar.org",
            Self::StellarTestnet => "https://horizon-testnet.stellar.org",
        }
    }

    /// Default Soroban RPC endpoint for simulation and submission.
    #[must_use]
    pub const fn soroban_rpc_url(self) -> &'static str {
        match self {
            Self::Stellar => "https://soroban-rpc.mainnet.stellar.gateway.fm",
            Self::StellarTestnet => "https://soroban-testnet.stellar.org",
        }
    }

    /// All supported networks.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::StellarTestnet, Self::Stellar]
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stellar" => Ok(Self::Stellar),
            "stellar-testnet" => Ok(Self::StellarTestnet),
            other => Err(ProtocolError::UnknownNetwork(other.to_owned())),
        }
    }
}
