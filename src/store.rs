//! Prediction store.
//!
//! Owns the prediction collection together with its loading / error
//! status and is the only writer of either. Everything else reads a
//! [`StoreSnapshot`].
//!
//! Every fetch is tagged with a sequence number when it is dispatched. A
//! response is applied only if no newer fetch has been dispatched since;
//! older responses are dropped without touching the collection, the
//! `loading` flag, or the error slot. After [`PredictionStore::shutdown`]
//! every late response is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::api::PredictionApi;
use crate::types::{Prediction, PredictionDraft, PredictionId, PredictorType, Stake, SubmissionReceipt};

// ---------------------------------------------------------------------------
// Errors & snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network / HTTP / decoding failure. The same text is held in the
    /// store's error slot.
    #[error("{0}")]
    Transport(String),

    /// A newer fetch was dispatched before this one resolved.
    #[error("Fetch #{seq} superseded by fetch #{latest}")]
    Superseded { seq: u64, latest: u64 },

    /// Rejected locally before anything was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Prediction store has been shut down")]
    Closed,

    /// The caller aborted the request before it resolved.
    #[error("Request cancelled")]
    Cancelled,
}

/// Read-only view of the store at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub predictions: Arc<Vec<Prediction>>,
    /// A fetch is outstanding.
    pub loading: bool,
    /// A create request is outstanding.
    pub creating: bool,
    pub error: Option<String>,
    /// Sequence number of the fetch that produced `predictions`; 0 before
    /// the first successful fetch.
    pub revision: u64,
}

impl StoreSnapshot {
    pub fn is_busy(&self) -> bool {
        self.loading || self.creating
    }

    pub fn find(&self, id: PredictionId) -> Option<&Prediction> {
        self.predictions.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    predictions: Arc<Vec<Prediction>>,
    loading: bool,
    creating: usize,
    error: Option<String>,
    /// Latest dispatched fetch sequence number.
    dispatched: u64,
    revision: u64,
    closed: bool,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct PredictionStore<A> {
    api: A,
    state: Mutex<StoreState>,
}

impl<A: PredictionApi> PredictionStore<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let st = self.lock();
        StoreSnapshot {
            predictions: Arc::clone(&st.predictions),
            loading: st.loading,
            creating: st.creating > 0,
            error: st.error.clone(),
            revision: st.revision,
        }
    }

    pub fn predictions(&self) -> Arc<Vec<Prediction>> {
        Arc::clone(&self.lock().predictions)
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Dismiss the current error banner.
    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Tear the store down. Outstanding requests still resolve but their
    /// results are discarded.
    pub fn shutdown(&self) {
        let mut st = self.lock();
        if !st.closed {
            st.closed = true;
            st.loading = false;
            info!(predictions = st.predictions.len(), "Prediction store shut down");
        }
    }

    // -- Operations ------------------------------------------------------

    /// Replace the collection with the backend's current list.
    ///
    /// On failure the previous collection is kept and the error slot is
    /// set. Returns the collection that is visible afterwards.
    pub async fn fetch_all(&self) -> Result<Arc<Vec<Prediction>>, StoreError> {
        let seq = {
            let mut st = self.lock();
            if st.closed {
                return Err(StoreError::Closed);
            }
            st.dispatched += 1;
            st.loading = true;
            st.dispatched
        };
        debug!(seq, "Fetching predictions");

        let result = self.api.fetch_predictions().await;

        let mut st = self.lock();
        if st.closed {
            debug!(seq, "Discarding fetch response after shutdown");
            return Err(StoreError::Closed);
        }
        if seq < st.dispatched {
            debug!(seq, latest = st.dispatched, "Discarding superseded fetch response");
            return Err(StoreError::Superseded {
                seq,
                latest: st.dispatched,
            });
        }

        st.loading = false;
        match result {
            Ok(predictions) => {
                info!(seq, count = predictions.len(), "Predictions refreshed");
                st.predictions = Arc::new(predictions);
                st.error = None;
                st.revision = seq;
                Ok(Arc::clone(&st.predictions))
            }
            Err(e) => {
                let message = format!("Failed to load predictions: {e:#}");
                warn!(seq, error = %message, kept = st.predictions.len(), "Fetch failed");
                st.error = Some(message.clone());
                Err(StoreError::Transport(message))
            }
        }
    }

    /// Generate an AI prediction for `asset`, then refresh the list.
    ///
    /// The symbol is trimmed and uppercased before it is sent; a blank
    /// symbol is rejected without contacting the backend.
    ///
    /// The refresh is dispatched only after the create call has resolved.
    /// A failed refresh is recorded in the error slot but does not undo
    /// the creation.
    pub async fn create_ai_prediction(&self, asset: &str) -> Result<Prediction, StoreError> {
        let asset = asset.trim().to_uppercase();
        if asset.is_empty() {
            return Err(StoreError::InvalidRequest("asset symbol is empty".to_string()));
        }
        self.begin_create()?;
        info!(asset = %asset, "Requesting AI prediction");

        let result = self.api.create_ai_prediction(&asset).await;
        self.finish_create(result, "Failed to create AI prediction").await
    }

    /// Publish a KOL prediction, then refresh the list.
    pub async fn create_kol_prediction(
        &self,
        draft: &PredictionDraft,
    ) -> Result<Prediction, StoreError> {
        if draft.predictor_type != PredictorType::Kol {
            return Err(StoreError::InvalidRequest(format!(
                "expected a KOL prediction, got {}",
                draft.predictor_type
            )));
        }
        draft
            .validate()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;
        self.begin_create()?;
        info!(asset = %draft.asset, kind = draft.kind.name(), "Publishing KOL prediction");

        let result = self.api.create_kol_prediction(draft).await;
        self.finish_create(result, "Failed to create KOL prediction").await
    }

    /// Forward a stake to the backend.
    ///
    /// The local collection is not patched; pool changes show up through
    /// the refresh that follows a successful submission.
    pub async fn submit_stake(&self, stake: &Stake) -> Result<SubmissionReceipt, StoreError> {
        self.ensure_open()?;
        debug!(stake = %stake, "Submitting stake");

        let result = self.api.submit_stake(stake).await;
        self.ensure_open()?;
        let receipt = result.map_err(|e| self.record_failure("Failed to submit stake", e))?;

        info!(
            prediction_id = stake.prediction_id,
            choice = %stake.choice,
            amount = %stake.amount,
            "Stake accepted"
        );
        self.refresh_after("stake submitted").await;
        Ok(receipt)
    }

    // -- Internal helpers ------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn begin_create(&self) -> Result<(), StoreError> {
        let mut st = self.lock();
        if st.closed {
            return Err(StoreError::Closed);
        }
        st.creating += 1;
        Ok(())
    }

    async fn finish_create(
        &self,
        result: anyhow::Result<Prediction>,
        context: &str,
    ) -> Result<Prediction, StoreError> {
        {
            let mut st = self.lock();
            st.creating = st.creating.saturating_sub(1);
            if st.closed {
                debug!("Discarding create response after shutdown");
                return Err(StoreError::Closed);
            }
        }

        let created = result.map_err(|e| self.record_failure(context, e))?;
        info!(
            id = created.id,
            asset = %created.asset,
            predictor = %created.predictor_type,
            "Prediction created, refreshing list"
        );
        self.refresh_after("prediction created").await;
        Ok(created)
    }

    /// Follow-up refresh after a successful write.
    async fn refresh_after(&self, reason: &str) {
        match self.fetch_all().await {
            Ok(_) => {}
            Err(StoreError::Superseded { seq, latest }) => {
                debug!(reason, seq, latest, "Follow-up refresh superseded");
            }
            Err(e) => {
                warn!(reason, error = %e, "Follow-up refresh failed");
            }
        }
    }

    fn record_failure(&self, context: &str, err: anyhow::Error) -> StoreError {
        let message = format!("{context}: {err:#}");
        warn!(error = %message, "Request failed");
        let mut st = self.lock();
        if st.closed {
            return StoreError::Closed;
        }
        st.error = Some(message.clone());
        StoreError::Transport(message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
