//! The asset-creation pipeline: inference, then storage, then mint.
//!
//! [`PipelineController`] owns the run state. A submission is claimed synchronously
//! (validated, and refused while another run is active), then executed stage by
//! stage. Every stage failure ends the run in [`PipelineState::Failed`]; nothing is
//! retried and nothing escapes to the caller as an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::{ContractHandle, Signer};
use crate::inference::ImageGenerator;
use crate::mint::MintSubmitter;
use crate::models::{
    ErrorKind, GeneratedImage, MintForm, MintRequest, PipelineFailure, PipelineState, RunSnapshot, StoredAsset,
    ValidationError,
};
use crate::storage::AssetStore;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a mint is already in progress")]
    Busy,
}

#[derive(Debug, Default)]
struct RunRecord {
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    state: PipelineState,
}

/// Run state plus its event stream, shared with outstanding [`ClaimedRun`]s.
#[derive(Debug)]
struct Shared {
    record: Mutex<RunRecord>,
    events: broadcast::Sender<PipelineState>,
}

impl Shared {
    /// Move the run forward. Returns the state now in effect.
    fn advance(&self, run_id: Uuid, next: PipelineState) -> PipelineState {
        let mut record = self.record.lock();
        if record.run_id != Some(run_id) || next.rank() <= record.state.rank() {
            error!(%run_id, from = ?record.state, to = ?next, "Refusing out-of-order transition");
            return record.state.clone();
        }
        if next.is_terminal() {
            record.finished_at = Some(Utc::now());
        }
        record.state = next.clone();
        // sent under the lock so subscribers see transitions in order
        let _ = self.events.send(next.clone());
        next
    }
}

/// Proof that a submission was accepted. Only [`PipelineController::execute`] consumes it.
///
/// Dropping a run that has not reached a terminal state (never executed, or its
/// task panicked or was cancelled) fails it with [`ErrorKind::Aborted`], so the
/// controller does not stay busy.
#[derive(Debug)]
pub struct ClaimedRun {
    run_id: Uuid,
    request: MintRequest,
    shared: Arc<Shared>,
}

impl ClaimedRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn request(&self) -> &MintRequest {
        &self.request
    }
}

impl Drop for ClaimedRun {
    fn drop(&mut self) {
        let active = {
            let record = self.shared.record.lock();
            record.run_id == Some(self.run_id) && record.state.is_active()
        };
        if !active {
            return;
        }
        warn!(run_id = %self.run_id, "⚠️ Run dropped before finishing");
        self.shared.advance(
            self.run_id,
            PipelineState::Failed {
                failure: PipelineFailure {
                    kind: ErrorKind::Aborted,
                    message: "run aborted".into(),
                    image: None,
                    asset: None,
                },
            },
        );
    }
}

pub struct PipelineController {
    generator: Arc<dyn ImageGenerator>,
    store: Arc<dyn AssetStore>,
    minter: MintSubmitter,
    shared: Arc<Shared>,
}

impl PipelineController {
    pub fn new(generator: Arc<dyn ImageGenerator>, store: Arc<dyn AssetStore>, minter: MintSubmitter) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            generator,
            store,
            minter,
            shared: Arc::new(Shared { record: Mutex::new(RunRecord::default()), events }),
        }
    }

    /// Every state entered from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineState> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.shared.record.lock().state.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.record.lock().state.is_active()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let record = self.shared.record.lock();
        RunSnapshot {
            run_id: record.run_id,
            started_at: record.started_at,
            finished_at: record.finished_at,
            busy: record.state.is_active(),
            label: record.state.label(),
            state: record.state.clone(),
        }
    }

    /// Validate the form and reserve the controller for a new run.
    ///
    /// Rejections leave the current state untouched. On success the previous run's
    /// artifacts are discarded and the state becomes `Validating`.
    pub fn claim(&self, form: &MintForm) -> Result<ClaimedRun, SubmitError> {
        let mut record = self.shared.record.lock();
        if record.state.is_active() {
            warn!("Rejecting submission: run {:?} still active", record.run_id);
            return Err(SubmitError::Busy);
        }

        let request = MintRequest::try_from(form).map_err(|e| {
            info!("Rejecting submission: {}", e);
            SubmitError::from(e)
        })?;

        let run_id = Uuid::new_v4();
        *record = RunRecord {
            run_id: Some(run_id),
            started_at: Some(Utc::now()),
            finished_at: None,
            state: PipelineState::Validating,
        };
        let _ = self.shared.events.send(PipelineState::Validating);
        info!(%run_id, nft_name = request.name(), "🚀 Run accepted");

        Ok(ClaimedRun { run_id, request, shared: self.shared.clone() })
    }

    /// Run the stages of a claimed submission to a terminal state.
    pub async fn execute(&self, run: ClaimedRun, signer: &dyn Signer, contract: &ContractHandle) -> PipelineState {
        // `run` stays alive until a terminal state so an unwinding stage still releases it
        let run_id = run.run_id;
        let request = &run.request;

        self.advance(run_id, PipelineState::GeneratingImage);
        let image = match self.generator.generate(request.prompt()).await {
            Ok(image) => image,
            Err(e) => return self.fail(run_id, ErrorKind::Inference, e.to_string(), None, None),
        };
        info!(%run_id, generator = self.generator.name(), "Image ready: {} ({} bytes)", image.mime_type, image.len());

        self.advance(run_id, PipelineState::Uploading);
        let asset = match self.store.upload(&image, request).await {
            Ok(asset) => asset,
            Err(e) => return self.fail(run_id, ErrorKind::Storage, e.to_string(), Some(&image), None),
        };
        info!(%run_id, store = self.store.name(), "Metadata at {}", asset.metadata_url);

        self.advance(run_id, PipelineState::Minting);
        let minted = self.minter.mint(&asset.metadata_url, signer, contract).await;
        let receipt = match minted {
            Ok(receipt) => receipt,
            Err(e) => return self.fail(run_id, ErrorKind::Mint(e.kind), e.message, Some(&image), Some(asset)),
        };

        info!(%run_id, tx = %receipt.transaction_hash, "✅ Minted");
        self.advance(
            run_id,
            PipelineState::Succeeded {
                receipt,
                asset,
                image_data_url: image.to_data_url(),
            },
        )
    }

    /// Claim and execute in one call.
    pub async fn submit(
        &self,
        form: &MintForm,
        signer: &dyn Signer,
        contract: &ContractHandle,
    ) -> Result<PipelineState, SubmitError> {
        let run = self.claim(form)?;
        Ok(self.execute(run, signer, contract).await)
    }

    fn fail(
        &self,
        run_id: Uuid,
        kind: ErrorKind,
        message: String,
        image: Option<&GeneratedImage>,
        asset: Option<StoredAsset>,
    ) -> PipelineState {
        error!(%run_id, ?kind, "❌ Run failed: {}", message);
        self.advance(
            run_id,
            PipelineState::Failed {
                failure: PipelineFailure {
                    kind,
                    message,
                    image: image.map(GeneratedImage::summary),
                    asset,
                },
            },
        )
    }

    fn advance(&self, run_id: Uuid, next: PipelineState) -> PipelineState {
        self.shared.advance(run_id, next)
    }
}
