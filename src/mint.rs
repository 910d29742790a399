use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::chain::{abi, ChainError, ContractHandle, Signer, TransactionReceipt, TransactionRequest};
use crate::models::MintReceipt;

/// Price paid with every mint: 1 ether, in wei.
pub const MINT_PRICE_WEI: u128 = 1_000_000_000_000_000_000;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MintErrorKind {
    /// The account owner declined to sign.
    UserRejected,
    /// The chain refused or reverted the transaction.
    Reverted,
    /// The transaction was sent but never reached confirmation.
    Unconfirmed,
}

impl fmt::Display for MintErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintErrorKind::UserRejected => write!(f, "user rejected"),
            MintErrorKind::Reverted => write!(f, "reverted"),
            MintErrorKind::Unconfirmed => write!(f, "unconfirmed"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("mint {kind}: {message}")]
pub struct MintError {
    pub kind: MintErrorKind,
    pub message: String,
}

impl MintError {
    pub fn new(kind: MintErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Classify a failure to get the transaction accepted at all.
    fn from_submission(err: ChainError) -> Self {
        let kind = if err.is_user_rejection() {
            MintErrorKind::UserRejected
        } else {
            match err {
                // the node answered and refused it
                ChainError::Rpc { .. } => MintErrorKind::Reverted,
                // no answer: the transaction may or may not be in flight
                ChainError::Http(_) | ChainError::Decode(_) => MintErrorKind::Unconfirmed,
            }
        };
        Self::new(kind, err.to_string())
    }
}

/// Submits `mint(metadataURL)` paying [`MINT_PRICE_WEI`] and waits for the receipt.
#[derive(Debug, Clone)]
pub struct MintSubmitter {
    poll_interval: Duration,
}

impl Default for MintSubmitter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl MintSubmitter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn build_transaction(metadata_url: &str, contract: &ContractHandle) -> TransactionRequest {
        TransactionRequest {
            from: None,
            to: contract.address().to_string(),
            value: abi::quantity(MINT_PRICE_WEI),
            data: abi::to_hex(&abi::encode_string_call(abi::MINT_SELECTOR, metadata_url)),
        }
    }

    pub async fn mint(
        &self,
        metadata_url: &str,
        signer: &dyn Signer,
        contract: &ContractHandle,
    ) -> Result<MintReceipt, MintError> {
        info!("⛓️ Minting {} on {}", metadata_url, contract.address());
        let tx = Self::build_transaction(metadata_url, contract);

        let hash = signer.send_transaction(tx).await.map_err(|e| {
            error!("❌ Mint transaction not accepted: {}", e);
            MintError::from_submission(e)
        })?;
        info!("📤 Mint transaction sent: {}", hash);

        let receipt = self.await_confirmation(&hash, contract).await?;
        info!("✅ Mint confirmed in block {}", receipt.block_number.as_deref().unwrap_or("?"));
        Ok(MintReceipt { transaction_hash: receipt.transaction_hash, confirmed: true })
    }

    /// Poll until the receipt lands. No deadline: the wait ends on a receipt,
    /// on the node forgetting the transaction, or on losing the node.
    async fn await_confirmation(&self, hash: &str, contract: &ContractHandle) -> Result<TransactionReceipt, MintError> {
        let reader = contract.reader();
        loop {
            match reader.transaction_receipt(hash).await {
                Ok(Some(receipt)) if receipt.succeeded() => return Ok(receipt),
                Ok(Some(_)) => {
                    return Err(MintError::new(MintErrorKind::Reverted, format!("transaction {} reverted", hash)));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(MintError::new(
                        MintErrorKind::Unconfirmed,
                        format!("lost track of transaction {}: {}", hash, e),
                    ));
                }
            }

            match reader.transaction_known(hash).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(MintError::new(
                        MintErrorKind::Unconfirmed,
                        format!("transaction {} was dropped before confirmation", hash),
                    ));
                }
                Err(e) => {
                    return Err(MintError::new(
                        MintErrorKind::Unconfirmed,
                        format!("lost track of transaction {}: {}", hash, e),
                    ));
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
