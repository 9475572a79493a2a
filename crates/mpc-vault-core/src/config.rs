//! Vault configuration

use crate::chain::{BitcoinConfig, EvmConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Most decimals whose unit (10^decimals) fits in a u128 amount
const MAX_DECIMALS: u32 = u128::MAX.ilog10();

/// Configuration for the vault and its chain wallets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Ethereum-family chain
    pub evm: EvmConfig,
    /// Bitcoin network
    pub bitcoin: BitcoinConfig,
    /// Protocol session settings
    pub session: SessionSettings,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            evm: EvmConfig::ethereum_sepolia(),
            bitcoin: BitcoinConfig::testnet(),
            session: SessionSettings::default(),
        }
    }
}

/// Settings for protocol sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionSettings {
    /// Seconds to wait for each protocol round.
    ///
    /// Default is 30 seconds.
    pub timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl VaultConfig {
    /// Load a config from a TOML file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: VaultConfig =
            toml::from_str(contents).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.evm.rpc_urls.is_empty() {
            return Err(Error::InvalidConfig("evm.rpc_urls must not be empty".into()));
        }
        if u32::from(self.evm.decimals) > MAX_DECIMALS {
            return Err(Error::InvalidConfig(format!(
                "evm.decimals must be at most {}, got {}",
                MAX_DECIMALS, self.evm.decimals
            )));
        }
        if self.bitcoin.esplora_url.is_empty() {
            return Err(Error::InvalidConfig(
                "bitcoin.esplora_url must not be empty".into(),
            ));
        }
        if self.session.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "session.timeout-secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
