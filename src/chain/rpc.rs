use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{abi, ChainError, ChainReader, Signer, TransactionReceipt, TransactionRequest};

/// Ethereum JSON-RPC over HTTP.
///
/// Signing is delegated to the node (`eth_sendTransaction`), the same way a
/// browser wallet signs for the dapp: keys never enter this process.
pub struct JsonRpcClient {
    client: Client,
    url: String,
    account: Option<String>,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            account: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Sign with this account instead of the node's first one.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(%method, id, "JSON-RPC request");

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChainError::Http(format!("status={} body={}", status, text)));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ChainError::Rpc { code: err.code, message: err.message });
        }
        Ok(parsed.result)
    }

    async fn request_string(&self, method: &str, params: Value) -> Result<String, ChainError> {
        match self.request(method, params).await? {
            Value::String(s) => Ok(s),
            other => Err(ChainError::Decode(format!("{} returned {}", method, other))),
        }
    }
}

#[async_trait]
impl Signer for JsonRpcClient {
    async fn address(&self) -> Result<String, ChainError> {
        if let Some(account) = &self.account {
            return Ok(account.clone());
        }
        let accounts: Vec<String> = serde_json::from_value(self.request("eth_accounts", json!([])).await?)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::Decode("node reports no accounts".into()))
    }

    async fn send_transaction(&self, mut tx: TransactionRequest) -> Result<String, ChainError> {
        if tx.from.is_none() {
            tx.from = Some(self.address().await?);
        }
        self.request_string("eth_sendTransaction", json!([tx])).await
    }
}

#[async_trait]
impl ChainReader for JsonRpcClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self.request_string("eth_chainId", json!([])).await?;
        abi::parse_quantity(&id)
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let params = json!([{ "to": to, "data": abi::to_hex(data) }, "latest"]);
        let out = self.request_string("eth_call", params).await?;
        abi::from_hex(&out)
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, ChainError> {
        let value = self.request("eth_getTransactionReceipt", json!([hash])).await?;
        serde_json::from_value(value).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn transaction_known(&self, hash: &str) -> Result<bool, ChainError> {
        let value = self.request("eth_getTransactionByHash", json!([hash])).await?;
        Ok(!value.is_null())
    }
}
