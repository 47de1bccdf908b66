//! In-memory backend for integration testing.
//!
//! Provides a deterministic `PredictionApi` implementation that serves a
//! known list, accepts creations and stakes, and records every call. Each
//! fetch or stake can be held open with a gate so tests control the order
//! in which responses resolve.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

use predictx::api::PredictionApi;
use predictx::types::*;

/// Calls seen by the backend, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Fetch,
    CreateAi,
    CreateKol,
    Stake,
}

/// A mock prediction backend. All state is controllable from test code.
pub struct MockBackend {
    predictions: Mutex<Vec<Prediction>>,
    next_id: AtomicU64,
    stakes: Mutex<Vec<Stake>>,
    calls: Mutex<Vec<Call>>,
    /// If set, every operation fails with this message.
    force_error: Mutex<Option<String>>,
    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    stake_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl MockBackend {
    /// Five predictions: three AI, two KOL, mixed kinds.
    pub fn new() -> Self {
        Self::with_predictions(default_predictions())
    }

    pub fn with_predictions(predictions: Vec<Prediction>) -> Self {
        let next_id = predictions.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        Self {
            predictions: Mutex::new(predictions),
            next_id: AtomicU64::new(next_id),
            stakes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
            fetch_gates: Mutex::new(VecDeque::new()),
            stake_gates: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Add a prediction as if another client had created it.
    pub fn push(&self, prediction: Prediction) {
        self.predictions.lock().unwrap().push(prediction);
    }

    /// Hold the next fetch open until the returned sender fires (or is
    /// dropped). The response is computed when the call arrives.
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn hold_next_stake(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.stake_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    pub fn stakes(&self) -> Vec<Stake> {
        self.stakes.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(anyhow!("{err}")),
            None => Ok(()),
        }
    }

    fn allocate_id(&self) -> PredictionId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionApi for MockBackend {
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>> {
        let result = self
            .record(Call::Fetch)
            .map(|_| self.predictions.lock().unwrap().clone());
        let gate = self.fetch_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result
    }

    async fn create_ai_prediction(&self, asset: &str) -> Result<Prediction> {
        self.record(Call::CreateAi)?;
        let prediction = Prediction {
            asset: asset.to_string(),
            ..forecast(self.allocate_id(), PredictorType::Ai, dec!(100), dec!(110))
        };
        self.push(prediction.clone());
        Ok(prediction)
    }

    async fn create_kol_prediction(&self, draft: &PredictionDraft) -> Result<Prediction> {
        self.record(Call::CreateKol)?;
        let prediction = Prediction {
            id: self.allocate_id(),
            asset: draft.asset.clone(),
            predictor_type: draft.predictor_type,
            confidence: draft.confidence,
            reasoning: draft.reasoning.clone(),
            supporters_count: Some(0),
            total_support: Some(Decimal::ZERO),
            kind: draft.kind.clone(),
        };
        self.push(prediction.clone());
        Ok(prediction)
    }

    async fn submit_stake(&self, stake: &Stake) -> Result<SubmissionReceipt> {
        let result = self.record(Call::Stake);
        let gate = self.stake_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        result?;
        self.stakes.lock().unwrap().push(stake.clone());
        Ok(SubmissionReceipt(json!({
            "status": "accepted",
            "predictionId": stake.prediction_id,
        })))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn forecast(
    id: PredictionId,
    predictor_type: PredictorType,
    current: Decimal,
    predicted: Decimal,
) -> Prediction {
    Prediction {
        id,
        asset: "BTC".to_string(),
        predictor_type,
        confidence: 0.75,
        reasoning: "Momentum".to_string(),
        supporters_count: None,
        total_support: None,
        kind: PredictionKind::PriceForecast(PriceForecast {
            current_price: current,
            predicted_price: predicted,
            market_data: None,
        }),
    }
}

pub fn market(id: PredictionId, predictor_type: PredictorType, yes: Decimal, no: Decimal) -> Prediction {
    Prediction {
        id,
        asset: "ETH".to_string(),
        predictor_type,
        confidence: 0.6,
        reasoning: "Upgrade ships on time".to_string(),
        supporters_count: Some(4),
        total_support: Some(dec!(120)),
        kind: PredictionKind::BinaryMarket(BinaryMarket {
            question: "Will ETH flip $5k before the deadline?".to_string(),
            end_time: Some(Utc::now() + Duration::days(10)),
            yes_price: yes,
            no_price: no,
            total_liquidity: dec!(1000),
        }),
    }
}

pub fn default_predictions() -> Vec<Prediction> {
    vec![
        forecast(1, PredictorType::Ai, dec!(40000), dec!(44000)),
        market(2, PredictorType::Kol, dec!(0.25), dec!(0.80)),
        forecast(3, PredictorType::Kol, dec!(2500), dec!(2300)),
        market(4, PredictorType::Ai, dec!(0.55), dec!(0.45)),
        forecast(5, PredictorType::Ai, dec!(150), dec!(180)),
    ]
}

/// Yield to other tasks until `cond` holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fetch_predictions() {
        let backend = MockBackend::new();
        let list = backend.fetch_predictions().await.unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list.iter().filter(|p| p.predictor_type == PredictorType::Ai).count(), 3);
        assert_eq!(backend.count(Call::Fetch), 1);
    }

    #[tokio::test]
    async fn test_mock_create_assigns_fresh_ids() {
        let backend = MockBackend::new();
        let a = backend.create_ai_prediction("SOL").await.unwrap();
        let b = backend.create_ai_prediction("DOGE").await.unwrap();
        assert_eq!((a.id, b.id), (6, 7));
        assert_eq!(backend.fetch_predictions().await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let backend = MockBackend::new();
        backend.set_error("simulated outage");
        assert!(backend.fetch_predictions().await.is_err());
        assert!(backend.create_ai_prediction("BTC").await.is_err());

        backend.clear_error();
        assert!(backend.fetch_predictions().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_records_stakes() {
        let backend = MockBackend::new();
        let target = market(2, PredictorType::Kol, dec!(0.25), dec!(0.80));
        let stake = Stake::new(&target, "0xabc", dec!(10), StakeChoice::Outcome(Outcome::No)).unwrap();
        let receipt = backend.submit_stake(&stake).await.unwrap();
        assert_eq!(receipt.field("status"), Some(&json!("accepted")));
        assert_eq!(backend.stakes(), vec![stake]);
    }
}
