#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use nft_forge::chain::{ChainError, ChainReader, ContractHandle, Signer, TransactionReceipt, TransactionRequest};
use nft_forge::models::{GeneratedImage, MintRequest, StoredAsset};
use nft_forge::{AssetStore, ImageGenerator, InferenceError, MemoryStore, StorageError};

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const MINTER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// Image generator double. Optionally parks until released.
pub struct StubGenerator {
    pub calls: AtomicUsize,
    fail: bool,
    panic: bool,
    gate: Option<Arc<Notify>>,
}

impl StubGenerator {
    pub fn ok() -> Self {
        Self { calls: AtomicUsize::new(0), fail: false, panic: false, gate: None }
    }

    pub fn failing() -> Self {
        Self { calls: AtomicUsize::new(0), fail: true, panic: false, gate: None }
    }

    /// Panics inside `generate` instead of returning.
    pub fn panicking() -> Self {
        Self { calls: AtomicUsize::new(0), fail: false, panic: true, gate: None }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { calls: AtomicUsize::new(0), fail: false, panic: false, gate: Some(gate) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _prompt: &str) -> Result<GeneratedImage, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.panic {
            panic!("model runtime crashed");
        }
        if self.fail {
            return Err(InferenceError::Status { status: 500, body: "model exploded".into() });
        }
        Ok(GeneratedImage::new(vec![0x42u8; 500], "image/png"))
    }
}

/// Storage double returning a fixed asset, or an error.
pub struct StubStore {
    pub uploads: AtomicUsize,
    result: Option<StoredAsset>,
}

impl StubStore {
    pub fn returning(content_id: &str) -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            result: Some(StoredAsset {
                content_id: content_id.to_string(),
                metadata_url: format!("https://ipfs.io/ipfs/{}/metadata.json", content_id),
            }),
        }
    }

    pub fn failing() -> Self {
        Self { uploads: AtomicUsize::new(0), result: None }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for StubStore {
    fn name(&self) -> &str {
        "stub"
    }

    async fn upload(&self, _image: &GeneratedImage, _request: &MintRequest) -> Result<StoredAsset, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| StorageError::Status { status: 429, message: "quota exceeded".into() })
    }
}

/// Counts uploads going into a real [`MemoryStore`].
pub struct CountingStore {
    pub inner: MemoryStore,
    pub uploads: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self { inner: MemoryStore::default(), uploads: AtomicUsize::new(0) }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn upload(&self, image: &GeneratedImage, request: &MintRequest) -> Result<StoredAsset, StorageError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.upload(image, request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBehavior {
    Confirm,
    RejectSignature,
    Revert,
    Drop,
}

/// Wallet plus node in one double.
pub struct FakeChain {
    behavior: Mutex<ChainBehavior>,
    pub sent: Mutex<Vec<TransactionRequest>>,
}

impl FakeChain {
    pub fn new(behavior: ChainBehavior) -> Arc<Self> {
        Arc::new(Self { behavior: Mutex::new(behavior), sent: Mutex::new(Vec::new()) })
    }

    pub fn set_behavior(&self, behavior: ChainBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn contract(self: &Arc<Self>) -> ContractHandle {
        ContractHandle::new(CONTRACT, self.clone())
    }
}

#[async_trait]
impl Signer for FakeChain {
    async fn address(&self) -> Result<String, ChainError> {
        Ok(MINTER.to_string())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<String, ChainError> {
        if *self.behavior.lock() == ChainBehavior::RejectSignature {
            return Err(ChainError::Rpc { code: 4001, message: "User rejected the request.".into() });
        }
        self.sent.lock().push(tx);
        Ok("0xabc".to_string())
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(31337)
    }

    async fn call(&self, _to: &str, _data: &[u8]) -> Result<Vec<u8>, ChainError> {
        Ok(Vec::new())
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TransactionReceipt>, ChainError> {
        let status = match *self.behavior.lock() {
            ChainBehavior::Drop => return Ok(None),
            ChainBehavior::Revert => "0x0",
            _ => "0x1",
        };
        Ok(Some(TransactionReceipt {
            transaction_hash: hash.to_string(),
            block_number: Some("0x1".into()),
            status: Some(status.into()),
        }))
    }

    async fn transaction_known(&self, _hash: &str) -> Result<bool, ChainError> {
        Ok(*self.behavior.lock() != ChainBehavior::Drop)
    }
}
