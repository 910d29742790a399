//! Chain access: the signer that authorizes transactions and the read side
//! used to query the NFT contract and follow a transaction to confirmation.

pub mod abi;
pub mod rpc;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rpc::JsonRpcClient;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected RPC response: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether the wallet owner declined to sign.
    pub fn is_user_rejection(&self) -> bool {
        match self {
            ChainError::Rpc { code, message } => {
                let message = message.to_lowercase();
                *code == USER_REJECTED_CODE
                    || message.contains("user rejected")
                    || message.contains("user denied")
            }
            _ => false,
        }
    }
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Option<String>,
    pub to: String,
    /// Hex quantity in wei.
    pub value: String,
    /// Hex calldata.
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub block_number: Option<String>,
    /// `0x1` success, `0x0` reverted. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        !matches!(self.status.as_deref(), Some("0x0") | Some("0x00"))
    }
}

/// Holds the key authority for an account and submits transactions on its behalf.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn address(&self) -> Result<String, ChainError>;

    /// Sign and broadcast; returns the transaction hash.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, ChainError>;
}

/// Read-only view of the chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError>;

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Whether the node still knows the transaction, mined or pending.
    async fn transaction_known(&self, hash: &str) -> Result<bool, ChainError>;
}

/// The deployed NFT contract on the active network.
#[derive(Clone)]
pub struct ContractHandle {
    address: String,
    reader: Arc<dyn ChainReader>,
}

impl ContractHandle {
    pub fn new(address: impl Into<String>, reader: Arc<dyn ChainReader>) -> Self {
        Self { address: address.into(), reader }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn reader(&self) -> &dyn ChainReader {
        self.reader.as_ref()
    }

    /// ERC-721 `name()`; doubles as the startup connectivity check.
    pub async fn name(&self) -> Result<String, ChainError> {
        let out = self.reader.call(&self.address, &abi::encode_call(abi::NAME_SELECTOR)).await?;
        abi::decode_string(&out)
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle").field("address", &self.address).finish()
    }
}
