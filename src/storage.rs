use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::{multipart, Client};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info};

use crate::models::{GeneratedImage, MintRequest, StoredAsset};

pub const DEFAULT_API_URL: &str = "https://api.nft.storage";
pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("storage service returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("storage service rejected the upload: {0}")]
    Rejected(String),
    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Publishes an image and its name/description as one content-addressed bundle.
#[async_trait]
pub trait AssetStore: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, image: &GeneratedImage, request: &MintRequest) -> Result<StoredAsset, StorageError>;
}

/// Gateway URL of the bundle's `metadata.json`.
pub fn metadata_url(gateway: &str, content_id: &str) -> String {
    format!("{}/{}/{}", gateway.trim_end_matches('/'), content_id, METADATA_FILE)
}

/// nft.storage `/store` client.
pub struct NftStorageClient {
    client: Client,
    api_key: String,
    api_url: String,
    gateway: String,
}

impl NftStorageClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: DEFAULT_API_URL.to_string(),
            gateway: DEFAULT_GATEWAY.to_string(),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Option<StoreValue>,
    #[serde(default)]
    error: Option<StoreErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StoreValue {
    ipnft: String,
}

#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl AssetStore for NftStorageClient {
    fn name(&self) -> &str {
        "nft.storage"
    }

    async fn upload(&self, image: &GeneratedImage, request: &MintRequest) -> Result<StoredAsset, StorageError> {
        let url = format!("{}/store", self.api_url.trim_end_matches('/'));
        info!("🔗 Uploading {} ({} bytes) to {}", image.file_name(), image.len(), url);

        // File values travel as separate parts; the meta document holds a null in their place.
        let meta = json!({
            "name": request.name(),
            "description": request.description(),
            "image": null,
        });
        let image_part = multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name())
            .mime_str(&image.mime_type)
            .map_err(|e| StorageError::Payload(e.to_string()))?;
        let form = multipart::Form::new()
            .text("meta", meta.to_string())
            .part("image", image_part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Storage response status: {}", status);
        let body = response.text().await.map_err(|e| StorageError::Http(e.to_string()))?;
        let parsed = serde_json::from_str::<StoreResponse>(&body);

        if !status.is_success() {
            let message = parsed
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(body);
            error!("❌ Storage API error response: {}", message);
            return Err(StorageError::Status { status: status.as_u16(), message });
        }

        let parsed = parsed.map_err(|e| StorageError::Payload(format!("parse error: {}: {}", e, body)))?;
        if !parsed.ok {
            let message = parsed.error.map(|e| e.message).unwrap_or_else(|| "unknown error".into());
            return Err(StorageError::Rejected(message));
        }
        let value = parsed
            .value
            .ok_or_else(|| StorageError::Payload("response has no value".into()))?;

        info!("📌 Stored bundle {}", value.ipnft);
        Ok(StoredAsset {
            metadata_url: metadata_url(&self.gateway, &value.ipnft),
            content_id: value.ipnft,
        })
    }
}

/// In-process content-addressed store.
///
/// Each entry is addressed by the SHA-256 of its bytes. The bundle id is the digest of
/// the canonical `metadata.json`, which embeds the image digest, so identical uploads
/// always land on the same id.
pub struct MemoryStore {
    gateway: String,
    bundles: RwLock<HashMap<String, HashMap<String, Bytes>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_GATEWAY)
    }
}

impl MemoryStore {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self { gateway: gateway.into(), bundles: RwLock::default() }
    }

    pub fn fetch(&self, content_id: &str, path: &str) -> Option<Bytes> {
        self.bundles.read().get(content_id)?.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[async_trait]
impl AssetStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upload(&self, image: &GeneratedImage, request: &MintRequest) -> Result<StoredAsset, StorageError> {
        let file_name = image.file_name();
        let image_id = digest_hex(&image.bytes);

        // serde_json maps are key-sorted, which keeps the document canonical
        let metadata = json!({
            "name": request.name(),
            "description": request.description(),
            "image": format!("ipfs://{}/{}", image_id, file_name),
        });
        let metadata_bytes = serde_json::to_vec(&metadata).map_err(|e| StorageError::Payload(e.to_string()))?;
        let content_id = digest_hex(&metadata_bytes);

        let mut entries = HashMap::new();
        entries.insert(METADATA_FILE.to_string(), Bytes::from(metadata_bytes));
        entries.insert(file_name, image.bytes.clone());
        self.bundles.write().insert(content_id.clone(), entries);

        info!("📌 Stored bundle {} in memory", content_id);
        Ok(StoredAsset {
            metadata_url: metadata_url(&self.gateway, &content_id),
            content_id,
        })
    }
}
