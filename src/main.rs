use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use nft_forge::{
    chain::{ChainReader, ContractHandle, JsonRpcClient},
    config::{Config, NetworkRegistry},
    inference::{HuggingFaceClient, ImageGenerator, PlaceholderGenerator},
    mint::MintSubmitter,
    pipeline::PipelineController,
    routes::{router, AppState, NetworkInfo},
    storage::{AssetStore, MemoryStore, NftStorageClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let generator: Arc<dyn ImageGenerator> = match &config.hugging_face_api_key {
        Some(key) => {
            tracing::info!("Using inference key: {}...", key.chars().take(6).collect::<String>());
            Arc::new(HuggingFaceClient::new(key.clone()).with_model_url(&config.model_url))
        }
        None => {
            tracing::warn!("HUGGING_FACE_API_KEY not set, images will be placeholders");
            Arc::new(PlaceholderGenerator::default())
        }
    };

    let store: Arc<dyn AssetStore> = match &config.nft_storage_api_key {
        Some(key) => Arc::new(
            NftStorageClient::new(key.clone())
                .with_api_url(&config.nft_storage_url)
                .with_gateway(&config.ipfs_gateway),
        ),
        None => {
            tracing::warn!("NFT_STORAGE_API_KEY not set, bundles are kept in memory only");
            Arc::new(MemoryStore::new(&config.ipfs_gateway))
        }
    };

    let mut rpc = JsonRpcClient::new(&config.rpc_url);
    if let Some(account) = &config.minter_address {
        rpc = rpc.with_account(account);
    }
    let rpc = Arc::new(rpc);

    let chain_id = rpc
        .chain_id()
        .await
        .with_context(|| format!("chain node at {} unreachable", config.rpc_url))?;
    let registry = NetworkRegistry::load(&config.network_config)?;
    let contract_address = registry.address_for(chain_id)?.to_string();
    let contract = ContractHandle::new(contract_address.clone(), rpc.clone());
    let contract_name = contract
        .name()
        .await
        .with_context(|| format!("NFT contract at {} did not answer name()", contract_address))?;
    tracing::info!(chain_id, %contract_address, %contract_name, "Connected to NFT contract");

    let controller = Arc::new(PipelineController::new(
        generator,
        store,
        MintSubmitter::new(config.confirmation_poll),
    ));

    let state = AppState {
        controller,
        signer: rpc,
        contract,
        network: NetworkInfo { chain_id, contract_address, contract_name },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
