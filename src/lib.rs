//! Text prompt in, NFT out: generate an image, pin it with its metadata to
//! content-addressed storage, and mint the metadata URL on chain.

pub mod chain;
pub mod config;
pub mod inference;
pub mod mint;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod storage;

pub use chain::{ChainReader, ContractHandle, JsonRpcClient, Signer};
pub use inference::{HuggingFaceClient, ImageGenerator, InferenceError, PlaceholderGenerator};
pub use mint::{MintError, MintErrorKind, MintSubmitter};
pub use models::{GeneratedImage, MintForm, MintReceipt, MintRequest, PipelineState, StoredAsset};
pub use pipeline::{PipelineController, SubmitError};
pub use storage::{AssetStore, MemoryStore, NftStorageClient, StorageError};
