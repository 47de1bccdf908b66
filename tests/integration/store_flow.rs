//! End-to-end flows through `PredictionStore` and `WagerSession` against
//! the in-memory backend.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

use predictx::projection;
use predictx::store::{PredictionStore, StoreError};
use predictx::types::{Outcome, PredictionDraft, PredictorType, StakeChoice};
use predictx::wager::{WagerPhase, WagerSession};
use predictx::wallet::{StaticWallet, WalletProvider};

use crate::mock_api::{forecast, wait_until, Call, MockBackend};

fn setup() -> (Arc<MockBackend>, Arc<PredictionStore<Arc<MockBackend>>>) {
    let backend = Arc::new(MockBackend::new());
    let store = Arc::new(PredictionStore::new(Arc::clone(&backend)));
    (backend, store)
}

async fn wallet() -> StaticWallet {
    let wallet = StaticWallet::new(Some("0xfeed".to_string()));
    wallet.login().await.unwrap();
    wallet
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fetch_then_partition() {
    let (_backend, store) = setup();
    let list = assert_ok!(store.fetch_all().await);

    let parts = projection::partition(&list);
    assert_eq!(parts.ai.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 4, 5]);
    assert_eq!(parts.kol.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn test_repeated_fetch_is_stable() {
    let (backend, store) = setup();
    let first = store.fetch_all().await.unwrap();
    let second = store.fetch_all().await.unwrap();
    assert_eq!(*first, *second);
    assert_eq!(backend.count(Call::Fetch), 2);
}

#[tokio::test]
async fn test_loading_flag_tracks_outstanding_fetch() {
    let (backend, store) = setup();
    let release = backend.hold_next_fetch();

    let task = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_all().await }
    });
    wait_until(|| backend.count(Call::Fetch) == 1).await;
    assert!(store.is_loading());
    assert!(store.snapshot().is_busy());

    release.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert!(!store.is_loading());
    assert_eq!(store.snapshot().len(), 5);
}

#[tokio::test]
async fn test_failed_fetch_keeps_five_predictions() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();

    backend.set_error("connection reset");
    let err = assert_err!(store.fetch_all().await);
    assert!(matches!(err, StoreError::Transport(_)));

    let snap = store.snapshot();
    assert_eq!(snap.len(), 5);
    assert!(!snap.loading);
    assert!(snap.error.as_deref().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_out_of_order_response_is_discarded() {
    let (backend, store) = setup();
    let release = backend.hold_next_fetch();

    // Fetch #1 sees the original five but resolves last.
    let slow = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_all().await }
    });
    wait_until(|| backend.count(Call::Fetch) == 1).await;

    backend.push(forecast(6, PredictorType::Kol, dec!(10), dec!(12)));
    let fresh = store.fetch_all().await.unwrap();
    assert_eq!(fresh.len(), 6);

    release.send(()).unwrap();
    let stale = slow.await.unwrap();
    assert_eq!(stale.unwrap_err(), StoreError::Superseded { seq: 1, latest: 2 });

    let snap = store.snapshot();
    assert_eq!(snap.len(), 6);
    assert_eq!(snap.revision, 2);
    assert!(!snap.loading);
}

#[tokio::test]
async fn test_stale_failure_does_not_set_error() {
    let (backend, store) = setup();
    backend.set_error("timeout");
    let release = backend.hold_next_fetch();

    let slow = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_all().await }
    });
    wait_until(|| backend.count(Call::Fetch) == 1).await;

    backend.clear_error();
    store.fetch_all().await.unwrap();

    release.send(()).unwrap();
    assert!(matches!(
        slow.await.unwrap(),
        Err(StoreError::Superseded { .. })
    ));
    assert!(store.error().is_none());
    assert_eq!(store.snapshot().len(), 5);
}

#[tokio::test]
async fn test_shutdown_discards_late_response() {
    let (backend, store) = setup();
    let release = backend.hold_next_fetch();

    let pending = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_all().await }
    });
    wait_until(|| backend.count(Call::Fetch) == 1).await;

    store.shutdown();
    release.send(()).unwrap();
    assert_eq!(pending.await.unwrap().unwrap_err(), StoreError::Closed);

    let snap = store.snapshot();
    assert!(snap.is_empty());
    assert!(!snap.loading);
    assert!(snap.error.is_none());
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_ai_prediction_refreshes_after_create() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();

    let created = store.create_ai_prediction("btc").await.unwrap();
    assert_eq!(created.asset, "BTC");
    assert_eq!(created.predictor_type, PredictorType::Ai);

    assert_eq!(backend.calls(), vec![Call::Fetch, Call::CreateAi, Call::Fetch]);
    let snap = store.snapshot();
    assert_eq!(snap.len(), 6);
    assert!(snap
        .predictions
        .iter()
        .any(|p| p.id == created.id && p.asset == "BTC" && p.predictor_type == PredictorType::Ai));
    assert!(!snap.creating);
}

#[tokio::test]
async fn test_create_failure_keeps_collection() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    backend.set_error("generator unavailable");

    let err = assert_err!(store.create_ai_prediction("ETH").await);
    assert!(err.to_string().contains("generator unavailable"));
    assert_eq!(backend.count(Call::Fetch), 1);
    assert_eq!(store.snapshot().len(), 5);
}

#[tokio::test]
async fn test_create_kol_prediction_appears_in_kol_partition() {
    let (_backend, store) = setup();
    let draft = PredictionDraft {
        asset: "SOL".to_string(),
        predictor_type: PredictorType::Kol,
        confidence: 0.9,
        reasoning: "Breakout on the weekly".to_string(),
        kind: forecast(0, PredictorType::Kol, dec!(150), dec!(210)).kind,
    };
    let created = store.create_kol_prediction(&draft).await.unwrap();

    let list = store.predictions();
    let kol = projection::by_predictor_type(&list, PredictorType::Kol);
    assert_eq!(kol.last().map(|p| p.id), Some(created.id));
    assert_eq!(kol.last().map(|p| p.asset.as_str()), Some("SOL"));
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_stake_on_binary_market() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    let wallet = wallet().await;

    let target = store.snapshot().find(2).cloned().unwrap();
    let mut session = WagerSession::new(target);
    session.choose(StakeChoice::Outcome(Outcome::Yes));
    session.enter_amount("100");
    assert_eq!(session.payout_preview(), Some(dec!(400)));

    let result = session.submit(&*store, &wallet).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(session.phase(), WagerPhase::Confirmed);

    let stakes = backend.stakes();
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].user_address, "0xfeed");
    assert_eq!(stakes[0].choice, StakeChoice::Outcome(Outcome::Yes));
    // Refresh after the stake.
    assert_eq!(backend.calls().last(), Some(&Call::Fetch));
}

#[tokio::test]
async fn test_second_submit_while_submitting_sends_one_stake() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    let wallet = wallet().await;
    let release = backend.hold_next_stake();

    let mut session = WagerSession::new(store.snapshot().find(2).cloned().unwrap());
    session.choose(StakeChoice::Outcome(Outcome::No));
    session.enter_amount("50");
    assert_eq!(session.payout_preview(), Some(dec!(62.5)));

    let task = session.dispatch(Arc::clone(&store), &wallet).unwrap();
    wait_until(|| backend.count(Call::Stake) == 1).await;
    assert_eq!(session.phase(), WagerPhase::Submitting);

    assert!(session.dispatch(Arc::clone(&store), &wallet).is_none());
    assert!(session.submit(&*store, &wallet).await.is_none());

    release.send(()).unwrap();
    let (attempt, result) = task.join().await;
    assert!(session.settle(attempt, result));
    assert_eq!(session.phase(), WagerPhase::Confirmed);
    assert_eq!(backend.count(Call::Stake), 1);
    assert_eq!(backend.stakes().len(), 1);
}

#[tokio::test]
async fn test_cancelled_submission_result_is_ignored() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    let wallet = wallet().await;
    let _gate = backend.hold_next_stake();

    let mut session = WagerSession::new(store.snapshot().find(1).cloned().unwrap());
    session.choose(StakeChoice::SupportAi(true));
    session.enter_amount("25");

    let task = session.dispatch(Arc::clone(&store), &wallet).unwrap();
    wait_until(|| backend.count(Call::Stake) == 1).await;

    assert!(session.cancel());
    task.abort();
    let (attempt, result) = task.join().await;
    assert_eq!(result.unwrap_err(), StoreError::Cancelled);
    assert!(!session.settle(attempt, Err(StoreError::Cancelled)));
    assert_eq!(session.phase(), WagerPhase::AmountEntered);
    assert!(backend.stakes().is_empty());

    // A fresh attempt goes through.
    let result = session.submit(&*store, &wallet).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(session.attempt(), 3);
    assert_eq!(backend.stakes().len(), 1);
}

#[tokio::test]
async fn test_failed_stake_then_retry() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    let wallet = wallet().await;

    let mut session = WagerSession::new(store.snapshot().find(4).cloned().unwrap());
    session.choose(StakeChoice::Outcome(Outcome::No));
    session.enter_amount("9");

    backend.set_error("502 Bad Gateway");
    let result = session.submit(&*store, &wallet).await.unwrap();
    assert!(result.is_err());
    assert_eq!(session.phase(), WagerPhase::Failed);
    assert!(session.failure().is_some_and(|f| f.contains("502")));
    assert_eq!(store.snapshot().len(), 5);

    backend.clear_error();
    assert!(session.retry());
    assert!(session.submit(&*store, &wallet).await.unwrap().is_ok());
    assert_eq!(session.phase(), WagerPhase::Confirmed);
}

#[tokio::test]
async fn test_logged_out_wallet_sends_nothing() {
    let (backend, store) = setup();
    store.fetch_all().await.unwrap();
    let wallet = StaticWallet::new(None);

    let mut session = WagerSession::new(store.snapshot().find(2).cloned().unwrap());
    session.choose(StakeChoice::Outcome(Outcome::Yes));
    session.enter_amount("1");
    assert!(session.submit(&*store, &wallet).await.is_none());
    assert_eq!(backend.count(Call::Stake), 0);
}
