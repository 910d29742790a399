use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    chain::{ContractHandle, Signer},
    models::{MintForm, RunSnapshot},
    pipeline::{PipelineController, SubmitError},
};

/// What the startup connectivity check found.
#[derive(Debug, Serialize, Clone)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub contract_address: String,
    pub contract_name: String,
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
    pub signer: Arc<dyn Signer>,
    pub contract: ContractHandle,
    pub network: NetworkInfo,
}

#[derive(Debug)]
pub struct ApiError(SubmitError);

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SubmitError::Invalid(_) => StatusCode::BAD_REQUEST,
            SubmitError::Busy => StatusCode::CONFLICT,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/mint", post(submit_mint))
        .route("/api/state", get(get_state))
        .route("/api/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Accepts the form and runs the pipeline in the background; poll `/api/state` for progress.
pub async fn submit_mint(
    State(state): State<AppState>,
    Json(form): Json<MintForm>,
) -> Result<(StatusCode, Json<RunSnapshot>), ApiError> {
    let run = state.controller.claim(&form)?;
    let snapshot = state.controller.snapshot();

    let AppState { controller, signer, contract, .. } = state;
    tokio::spawn(async move {
        controller.execute(run, &*signer, &contract).await;
    });

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

pub async fn get_state(State(state): State<AppState>) -> Json<RunSnapshot> {
    Json(state.controller.snapshot())
}

pub async fn health(State(state): State<AppState>) -> Json<NetworkInfo> {
    Json(state.network.clone())
}
