mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, Notify};

use common::{ChainBehavior, CountingStore, FakeChain, StubGenerator, StubStore};
use nft_forge::mint::MintErrorKind;
use nft_forge::models::{ErrorKind, MintForm, MintReceipt, PipelineState, StoredAsset, ValidationError};
use nft_forge::{MintSubmitter, PipelineController, SubmitError};

fn controller(generator: Arc<StubGenerator>, store: Arc<dyn nft_forge::AssetStore>) -> Arc<PipelineController> {
    Arc::new(PipelineController::new(generator, store, MintSubmitter::new(Duration::from_millis(1))))
}

fn bike() -> MintForm {
    MintForm::new("Bike", "a red bicycle")
}

fn drain(rx: &mut broadcast::Receiver<PipelineState>) -> Vec<PipelineState> {
    let mut seen = Vec::new();
    while let Ok(state) = rx.try_recv() {
        seen.push(state);
    }
    seen
}

fn stage_names(states: &[PipelineState]) -> Vec<&'static str> {
    states
        .iter()
        .map(|s| match s {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::GeneratingImage => "generating",
            PipelineState::Uploading => "uploading",
            PipelineState::Minting => "minting",
            PipelineState::Succeeded { .. } => "succeeded",
            PipelineState::Failed { .. } => "failed",
        })
        .collect()
}

#[tokio::test]
async fn blank_inputs_never_reach_inference() {
    let generator = Arc::new(StubGenerator::ok());
    let ctl = controller(generator.clone(), Arc::new(StubStore::returning("bafy123")));
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    for form in [MintForm::new("", "a red bicycle"), MintForm::new("Bike", ""), MintForm::new(" ", "\t")] {
        let err = ctl.submit(&form, &*chain, &chain.contract()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
    }
    let err = ctl.claim(&MintForm::new("Bike", "")).unwrap_err();
    assert_eq!(err, SubmitError::Invalid(ValidationError::EmptyDescription));

    assert_eq!(ctl.state(), PipelineState::Idle);
    assert_eq!(generator.calls(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn red_bicycle_mints() {
    let generator = Arc::new(StubGenerator::ok());
    let store = Arc::new(StubStore::returning("bafy123"));
    let ctl = controller(generator.clone(), store.clone());
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    let end = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();

    let (receipt, asset, image_data_url) = match end {
        PipelineState::Succeeded { receipt, asset, image_data_url } => (receipt, asset, image_data_url),
        other => panic!("expected success, got {:?}", other),
    };
    assert_eq!(receipt, MintReceipt { transaction_hash: "0xabc".into(), confirmed: true });
    assert_eq!(
        asset,
        StoredAsset {
            content_id: "bafy123".into(),
            metadata_url: "https://ipfs.io/ipfs/bafy123/metadata.json".into(),
        }
    );
    assert!(image_data_url.starts_with("data:image/png;base64,"));

    let seen = drain(&mut events);
    assert_eq!(stage_names(&seen), vec!["validating", "generating", "uploading", "minting", "succeeded"]);

    let sent = chain.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, common::CONTRACT);
    assert_eq!(sent[0].value, "0xde0b6b3a7640000");

    let snapshot = ctl.snapshot();
    assert!(!snapshot.busy);
    assert!(snapshot.finished_at.is_some());
    assert_eq!(generator.calls(), 1);
    assert_eq!(store.uploads(), 1);
}

#[tokio::test]
async fn second_submit_is_rejected_while_active() {
    let gate = Arc::new(Notify::new());
    let generator = Arc::new(StubGenerator::gated(gate.clone()));
    let store = Arc::new(StubStore::returning("bafy123"));
    let ctl = controller(generator.clone(), store.clone());
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    let first = ctl.claim(&bike()).unwrap();
    let first_id = first.run_id();
    let running = {
        let ctl = ctl.clone();
        let chain = chain.clone();
        tokio::spawn(async move { ctl.execute(first, &*chain, &chain.contract()).await })
    };

    // wait until the run is parked inside inference
    loop {
        if events.recv().await.unwrap() == PipelineState::GeneratingImage {
            break;
        }
    }
    assert!(ctl.is_busy());

    let err = ctl
        .submit(&MintForm::new("Other", "a blue boat"), &*chain, &chain.contract())
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::Busy);
    assert_eq!(ctl.snapshot().run_id, Some(first_id));

    gate.notify_one();
    let end = running.await.unwrap();
    assert!(matches!(end, PipelineState::Succeeded { .. }));
    assert_eq!(generator.calls(), 1);
    assert_eq!(store.uploads(), 1);
}

#[tokio::test]
async fn inference_failure_is_terminal() {
    let store = Arc::new(StubStore::returning("bafy123"));
    let ctl = controller(Arc::new(StubGenerator::failing()), store.clone());
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    let end = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    let failure = end.failure().expect("run should fail");
    assert_eq!(failure.kind, ErrorKind::Inference);
    assert!(failure.message.contains("500"));
    assert_eq!(failure.image, None);
    assert_eq!(failure.asset, None);

    assert_eq!(stage_names(&drain(&mut events)), vec!["validating", "generating", "failed"]);
    assert_eq!(store.uploads(), 0);
    assert!(chain.sent.lock().is_empty());
    assert!(!ctl.is_busy());
}

#[tokio::test]
async fn storage_failure_keeps_image_as_context_only() {
    let ctl = controller(Arc::new(StubGenerator::ok()), Arc::new(StubStore::failing()));
    let chain = FakeChain::new(ChainBehavior::Confirm);

    let end = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    let failure = end.failure().expect("run should fail");
    assert_eq!(failure.kind, ErrorKind::Storage);
    assert_eq!(failure.image.as_ref().map(|i| i.size), Some(500));
    assert_eq!(failure.asset, None);
    assert!(chain.sent.lock().is_empty());
}

#[tokio::test]
async fn mint_failures_carry_their_kind() {
    for (behavior, kind) in [
        (ChainBehavior::RejectSignature, MintErrorKind::UserRejected),
        (ChainBehavior::Revert, MintErrorKind::Reverted),
        (ChainBehavior::Drop, MintErrorKind::Unconfirmed),
    ] {
        let ctl = controller(Arc::new(StubGenerator::ok()), Arc::new(StubStore::returning("bafy123")));
        let chain = FakeChain::new(behavior);
        let mut events = ctl.subscribe();

        let end = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
        let failure = end.failure().expect("run should fail");
        assert_eq!(failure.kind, ErrorKind::Mint(kind));
        assert_eq!(failure.asset.as_ref().map(|a| a.content_id.as_str()), Some("bafy123"));
        assert_eq!(
            stage_names(&drain(&mut events)),
            vec!["validating", "generating", "uploading", "minting", "failed"]
        );
    }
}

#[tokio::test]
async fn resubmitting_after_rejection_uploads_again() {
    let store = Arc::new(CountingStore::new());
    let ctl = controller(Arc::new(StubGenerator::ok()), store.clone());
    let chain = FakeChain::new(ChainBehavior::RejectSignature);

    let first = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    assert_eq!(first.failure().map(|f| f.kind), Some(ErrorKind::Mint(MintErrorKind::UserRejected)));
    let first_asset = first.failure().and_then(|f| f.asset.clone()).unwrap();

    chain.set_behavior(ChainBehavior::Confirm);
    let second = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    let asset = match second {
        PipelineState::Succeeded { asset, .. } => asset,
        other => panic!("expected success, got {:?}", other),
    };

    // each run uploads on its own; content addressing makes the ids agree
    assert_eq!(store.uploads(), 2);
    assert_eq!(asset, first_asset);
    assert_eq!(store.inner.len(), 1);
}

#[tokio::test]
async fn new_run_discards_previous_artifacts() {
    let ctl = controller(Arc::new(StubGenerator::ok()), Arc::new(StubStore::returning("bafy123")));
    let chain = FakeChain::new(ChainBehavior::Confirm);

    ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    let first_run = ctl.snapshot().run_id;

    let run = ctl.claim(&bike()).unwrap();
    assert_eq!(ctl.state(), PipelineState::Validating);
    assert_ne!(Some(run.run_id()), first_run);
    assert!(ctl.snapshot().finished_at.is_none());

    let end = ctl.execute(run, &*chain, &chain.contract()).await;
    assert!(matches!(end, PipelineState::Succeeded { .. }));
}

fn aborted(state: &PipelineState) -> bool {
    state
        .failure()
        .map(|f| f.kind == ErrorKind::Aborted && f.message == "run aborted")
        .unwrap_or(false)
}

#[tokio::test]
async fn dropped_claim_releases_the_controller() {
    let generator = Arc::new(StubGenerator::ok());
    let ctl = controller(generator.clone(), Arc::new(StubStore::returning("bafy123")));
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    drop(ctl.claim(&bike()).unwrap());

    assert!(!ctl.is_busy());
    assert!(aborted(&ctl.state()));
    assert!(ctl.snapshot().finished_at.is_some());
    let seen = drain(&mut events);
    assert_eq!(stage_names(&seen), vec!["validating", "failed"]);
    assert!(aborted(&seen[1]));

    let end = ctl.submit(&bike(), &*chain, &chain.contract()).await.unwrap();
    assert!(matches!(end, PipelineState::Succeeded { .. }));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn panicking_stage_releases_the_controller() {
    let ctl = controller(Arc::new(StubGenerator::panicking()), Arc::new(StubStore::returning("bafy123")));
    let chain = FakeChain::new(ChainBehavior::Confirm);
    let mut events = ctl.subscribe();

    let run = ctl.claim(&bike()).unwrap();
    let task = {
        let (ctl, chain) = (ctl.clone(), chain.clone());
        tokio::spawn(async move {
            ctl.execute(run, &*chain, &chain.contract()).await;
        })
    };
    let joined = task.await.unwrap_err();
    assert!(joined.is_panic());

    assert!(!ctl.is_busy());
    assert!(aborted(&ctl.state()));
    assert_eq!(stage_names(&drain(&mut events)), vec!["validating", "generating", "failed"]);

    assert!(ctl.claim(&bike()).is_ok());
}
