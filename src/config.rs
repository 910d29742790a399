use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::inference::DEFAULT_MODEL_URL;
use crate::storage::{DEFAULT_API_URL, DEFAULT_GATEWAY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read network config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid network config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no contract deployed for chain id {0}")]
    UnknownNetwork(u64),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Service settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    /// No key means placeholder images.
    pub hugging_face_api_key: Option<String>,
    pub model_url: String,
    /// No key means the in-memory store.
    pub nft_storage_api_key: Option<String>,
    pub nft_storage_url: String,
    pub ipfs_gateway: String,
    pub rpc_url: String,
    pub minter_address: Option<String>,
    pub network_config: PathBuf,
    pub confirmation_poll: Duration,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let confirmation_poll = match get("CONFIRMATION_POLL_MS") {
            Some(v) => Duration::from_millis(
                v.parse()
                    .map_err(|_| ConfigError::InvalidValue { key: "CONFIRMATION_POLL_MS", value: v.clone() })?,
            ),
            None => Duration::from_millis(1000),
        };
        let port = match get("PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "PORT", value: v.clone() })?,
            None => 8080,
        };

        Ok(Self {
            hugging_face_api_key: get("HUGGING_FACE_API_KEY"),
            model_url: get("HUGGING_FACE_MODEL_URL").unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            nft_storage_api_key: get("NFT_STORAGE_API_KEY"),
            nft_storage_url: get("NFT_STORAGE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            ipfs_gateway: get("IPFS_GATEWAY").unwrap_or_else(|| DEFAULT_GATEWAY.to_string()),
            rpc_url: get("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8545".to_string()),
            minter_address: get("MINTER_ADDRESS"),
            network_config: get("NETWORK_CONFIG").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.json")),
            confirmation_poll,
            port,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NetworkEntry {
    nft: ContractEntry,
}

#[derive(Debug, Clone, Deserialize)]
struct ContractEntry {
    address: String,
}

/// Deployed contract addresses keyed by chain id, e.g.
/// `{ "31337": { "nft": { "address": "0x5FbD…" } } }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct NetworkRegistry(HashMap<String, NetworkEntry>);

impl NetworkRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn address_for(&self, chain_id: u64) -> Result<&str, ConfigError> {
        self.0
            .get(&chain_id.to_string())
            .map(|entry| entry.nft.address.as_str())
            .ok_or(ConfigError::UnknownNetwork(chain_id))
    }
}
