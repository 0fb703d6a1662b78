//! Relayer configuration
//!
//! Everything comes from the environment (a `.env` file is loaded first when
//! present). Bridge addresses fall back to `contract_info.json`, and the
//! signing key to a key file.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;

use crate::fetcher::{ExhaustedWindowPolicy, FetchConfig};
use crate::relay::GasSettings;
use crate::retry::RetryConfig;

const DEFAULT_SOURCE_RPC: &str = "https://api.avax-test.network/ext/bc/C/rpc";
const DEFAULT_DESTINATION_RPC: &str = "https://data-seed-prebsc-1-s1.binance.org:8545/";

/// One side of the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Display name and cursor key
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub bridge_address: Address,
}

/// Main configuration for the relayer
#[derive(Clone)]
pub struct Config {
    pub source: ChainConfig,
    pub destination: ChainConfig,
    pub private_key: String,
    pub cursor_path: PathBuf,
    /// `None` disables the lookback floor
    pub lookback: Option<u64>,
    pub confirmations: u64,
    pub fetch: FetchConfig,
    /// Gas for `wrap` calls on the destination chain
    pub wrap_gas: GasSettings,
    /// Gas for `withdraw` calls on the source chain
    pub withdraw_gas: GasSettings,
    /// Extra rate-limit substrings for the default error classifier
    pub rate_limit_patterns: Vec<String>,
    pub poll_interval: Duration,
    pub metrics_port: Option<u16>,
}

/// Custom Debug that redacts the private key to prevent accidental log leakage.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("private_key", &"<redacted>")
            .field("cursor_path", &self.cursor_path)
            .field("lookback", &self.lookback)
            .field("confirmations", &self.confirmations)
            .field("fetch", &self.fetch)
            .field("wrap_gas", &self.wrap_gas)
            .field("withdraw_gas", &self.withdraw_gas)
            .field("rate_limit_patterns", &self.rate_limit_patterns)
            .field("poll_interval", &self.poll_interval)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

/// `contract_info.json`: `{"source": {"address": .., "abi": ..}, "destination": {..}}`
#[derive(Debug, Clone, Deserialize)]
struct ContractInfo {
    source: Option<ContractEntry>,
    destination: Option<ContractEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContractEntry {
    address: String,
}

impl Config {
    /// Load from a specific .env file path
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from the process environment
    pub fn load_from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let contract_info_path: PathBuf = vars
            .string("CONTRACT_INFO_PATH")
            .unwrap_or_else(|| "contract_info.json".to_string())
            .into();
        let contract_info = read_contract_info(&contract_info_path)?;

        let source_name = vars.string("SOURCE_NAME").unwrap_or_else(|| "source".to_string());
        let destination_name = vars
            .string("DESTINATION_NAME")
            .unwrap_or_else(|| "destination".to_string());

        let source = ChainConfig {
            bridge_address: bridge_address(
                &vars,
                "SOURCE_BRIDGE_ADDRESS",
                contract_info.as_ref().and_then(|c| c.source.as_ref()),
                &contract_info_path,
            )?,
            name: source_name,
            rpc_url: vars
                .string("SOURCE_RPC_URL")
                .unwrap_or_else(|| DEFAULT_SOURCE_RPC.to_string()),
            chain_id: vars.parse_or("SOURCE_CHAIN_ID", 43113)?,
        };

        let destination = ChainConfig {
            bridge_address: bridge_address(
                &vars,
                "DESTINATION_BRIDGE_ADDRESS",
                contract_info.as_ref().and_then(|c| c.destination.as_ref()),
                &contract_info_path,
            )?,
            name: destination_name,
            rpc_url: vars
                .string("DESTINATION_RPC_URL")
                .unwrap_or_else(|| DEFAULT_DESTINATION_RPC.to_string()),
            chain_id: vars.parse_or("DESTINATION_CHAIN_ID", 97)?,
        };

        let private_key = match vars.string("PRIVATE_KEY") {
            Some(key) => key,
            None => {
                let key_file = vars
                    .string("KEY_FILE")
                    .unwrap_or_else(|| "secret_key.txt".to_string());
                std::fs::read_to_string(&key_file).wrap_err_with(|| {
                    format!(
                        "PRIVATE_KEY is not set and key file {} could not be read",
                        key_file
                    )
                })?
            }
        };

        let lookback: u64 = vars.parse_or("LOOKBACK_BLOCKS", 5)?;
        let gas_limit = vars.parse_or("GAS_LIMIT", 300_000)?;

        let fetch = FetchConfig {
            initial_step: vars.parse_or("FETCH_INITIAL_STEP", 250)?,
            min_step: vars.parse_or("FETCH_MIN_STEP", 1)?,
            retry: RetryConfig {
                max_retries: vars.parse_or("FETCH_MAX_RETRY", 3)?,
                initial_backoff: Duration::from_millis(vars.parse_or("FETCH_BACKOFF_MS", 500)?),
                max_backoff: Duration::from_millis(vars.parse_or("FETCH_MAX_BACKOFF_MS", 8_000)?),
                max_total_backoff: Duration::from_millis(
                    vars.parse_or("FETCH_MAX_TOTAL_BACKOFF_MS", 60_000)?,
                ),
                ..RetryConfig::default()
            },
            exhausted_policy: match vars.string("FETCH_EXHAUSTED_POLICY") {
                Some(policy) => policy
                    .parse::<ExhaustedWindowPolicy>()
                    .map_err(|e| eyre!("FETCH_EXHAUSTED_POLICY: {}", e))?,
                None => ExhaustedWindowPolicy::Fail,
            },
        };

        let config = Config {
            source,
            destination,
            private_key: normalize_private_key(&private_key),
            cursor_path: vars
                .string("CURSOR_PATH")
                .unwrap_or_else(|| ".bridge.last".to_string())
                .into(),
            lookback: (lookback > 0).then_some(lookback),
            confirmations: vars.parse_or("CONFIRMATIONS", 0)?,
            fetch,
            wrap_gas: GasSettings::from_gwei(gas_limit, vars.parse_or("WRAP_GAS_PRICE_GWEI", 5)?),
            withdraw_gas: GasSettings::from_gwei(
                gas_limit,
                vars.parse_or("WITHDRAW_GAS_PRICE_GWEI", 12)?,
            ),
            rate_limit_patterns: vars
                .string("RATE_LIMIT_PATTERNS")
                .map(|raw| {
                    raw.split(',')
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            poll_interval: Duration::from_millis(vars.parse_or("POLL_INTERVAL_MS", 30_000)?),
            metrics_port: vars.parse_opt("METRICS_PORT")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for chain in [&self.source, &self.destination] {
            if chain.rpc_url.is_empty() {
                return Err(eyre!("{} rpc_url cannot be empty", chain.name));
            }
            if chain.bridge_address == Address::ZERO {
                return Err(eyre!("{} bridge address cannot be the zero address", chain.name));
            }
        }

        if self.source.name == self.destination.name {
            return Err(eyre!(
                "SOURCE_NAME and DESTINATION_NAME must differ, both are '{}' and would share a cursor entry",
                self.source.name
            ));
        }

        let key = hex::decode(self.private_key.trim_start_matches("0x"))
            .map_err(|_| eyre!("private key must be hex encoded"))?;
        if key.len() != 32 {
            return Err(eyre!(
                "private key must be 32 bytes (0x + 64 hex chars), got {} bytes",
                key.len()
            ));
        }

        self.fetch.validate()?;

        if self.poll_interval.is_zero() {
            return Err(eyre!("POLL_INTERVAL_MS must be greater than 0"));
        }

        Ok(())
    }
}

/// Typed view over a key lookup
struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| eyre!("{} has invalid value '{}': {}", key, raw, e))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }
}

fn read_contract_info(path: &Path) -> Result<Option<ContractInfo>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;
    let info = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Malformed contract info in {}", path.display()))?;
    Ok(Some(info))
}

fn bridge_address<F: Fn(&str) -> Option<String>>(
    vars: &Vars<'_, F>,
    key: &str,
    entry: Option<&ContractEntry>,
    contract_info_path: &Path,
) -> Result<Address> {
    let raw = vars
        .string(key)
        .or_else(|| entry.map(|e| e.address.clone()))
        .ok_or_else(|| {
            eyre!(
                "{} is not set and {} has no entry for it",
                key,
                contract_info_path.display()
            )
        })?;
    Address::from_str(raw.trim()).wrap_err_with(|| format!("{} is not a valid address", key))
}

/// Trim whitespace and ensure a `0x` prefix
fn normalize_private_key(raw: &str) -> String {
    let key = raw.trim();
    if key.starts_with("0x") || key.starts_with("0X") {
        format!("0x{}", &key[2..])
    } else {
        format!("0x{}", key)
    }
}
