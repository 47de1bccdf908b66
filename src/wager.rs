//! Wager sessions.
//!
//! A `WagerSession` tracks one user's stake on one displayed prediction:
//!
//! ```text
//! Idle -> OutcomeChosen -> AmountEntered -> Submitting -> Confirmed
//!                                ^               |
//!                                +--- Failed <---+
//! ```
//!
//! Input that does not satisfy a transition's preconditions is ignored:
//! the methods return `false` / `None` and the session stays where it was.
//! Each submission carries an attempt id; a result whose id does not
//! match the session's current attempt is discarded.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::PredictionApi;
use crate::payout;
use crate::store::{PredictionStore, StoreError, StoreSnapshot};
use crate::types::{Prediction, Stake, StakeChoice, SubmissionReceipt};
use crate::wallet::WalletProvider;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WagerPhase {
    Idle,
    OutcomeChosen,
    AmountEntered,
    Submitting,
    Confirmed,
    Failed,
}

impl fmt::Display for WagerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WagerPhase::Idle => "idle",
            WagerPhase::OutcomeChosen => "outcome chosen",
            WagerPhase::AmountEntered => "amount entered",
            WagerPhase::Submitting => "submitting",
            WagerPhase::Confirmed => "confirmed",
            WagerPhase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Parse a user-typed stake amount. Only finite, strictly positive values
/// are accepted.
pub fn parse_amount(input: &str) -> Option<Decimal> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    Decimal::from_str(input)
        .or_else(|_| Decimal::from_scientific(input))
        .ok()
        .filter(|amount| *amount > Decimal::ZERO)
}

/// A stake that has been handed out for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub attempt: u64,
    pub stake: Stake,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WagerSession {
    prediction: Prediction,
    phase: WagerPhase,
    choice: Option<StakeChoice>,
    amount_input: String,
    amount: Option<Decimal>,
    attempt: u64,
    receipt: Option<SubmissionReceipt>,
    failure: Option<String>,
}

impl WagerSession {
    pub fn new(prediction: Prediction) -> Self {
        Self {
            prediction,
            phase: WagerPhase::Idle,
            choice: None,
            amount_input: String::new(),
            amount: None,
            attempt: 0,
            receipt: None,
            failure: None,
        }
    }

    pub fn prediction(&self) -> &Prediction {
        &self.prediction
    }

    pub fn phase(&self) -> WagerPhase {
        self.phase
    }

    pub fn choice(&self) -> Option<StakeChoice> {
        self.choice
    }

    /// The parsed amount, if the current input is a valid stake.
    pub fn amount(&self) -> Option<Decimal> {
        self.amount
    }

    pub fn amount_input(&self) -> &str {
        &self.amount_input
    }

    /// Id of the most recent submission attempt (0 before the first).
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn can_submit(&self) -> bool {
        self.phase == WagerPhase::AmountEntered
    }

    fn is_locked(&self) -> bool {
        matches!(self.phase, WagerPhase::Submitting | WagerPhase::Confirmed)
    }

    // -- Input -----------------------------------------------------------

    /// Pick an outcome (binary markets) or a support side (forecasts).
    pub fn choose(&mut self, choice: StakeChoice) -> bool {
        if self.is_locked() || !choice.fits(&self.prediction.kind) {
            debug!(phase = %self.phase, choice = %choice, "Ignoring outcome selection");
            return false;
        }
        self.choice = Some(choice);
        self.recompute_phase();
        true
    }

    /// Record raw amount input. Returns whether it parsed to a valid stake.
    pub fn enter_amount(&mut self, input: &str) -> bool {
        if self.is_locked() {
            return false;
        }
        self.amount_input = input.to_string();
        self.amount = parse_amount(input);
        self.recompute_phase();
        self.amount.is_some()
    }

    fn recompute_phase(&mut self) {
        self.failure = None;
        self.phase = match (self.choice, self.amount) {
            (None, _) => WagerPhase::Idle,
            (Some(_), None) => WagerPhase::OutcomeChosen,
            (Some(_), Some(_)) => WagerPhase::AmountEntered,
        };
    }

    // -- Derived values --------------------------------------------------

    /// Potential payout for the current outcome and amount. Only binary
    /// markets have one; recomputed from current state on every call.
    pub fn payout_preview(&self) -> Option<Decimal> {
        match (self.choice, self.amount) {
            (Some(StakeChoice::Outcome(outcome)), Some(amount)) => {
                Some(payout::payout_for(&self.prediction, outcome, amount))
            }
            _ => None,
        }
    }

    /// Pick up refreshed prices for this prediction from a store snapshot.
    ///
    /// Returns false if the prediction is no longer listed. A selection
    /// that no longer fits the prediction's kind is dropped.
    pub fn sync(&mut self, snapshot: &StoreSnapshot) -> bool {
        let Some(latest) = snapshot.find(self.prediction.id) else {
            return false;
        };
        self.prediction = latest.clone();
        if let Some(choice) = self.choice {
            if !choice.fits(&self.prediction.kind) && !self.is_locked() {
                self.choice = None;
                self.recompute_phase();
            }
        }
        true
    }

    // -- Submission ------------------------------------------------------

    /// Move to `Submitting` and hand out the stake to send.
    ///
    /// Returns `None` unless the session is in `AmountEntered`, so at most
    /// one submission is ever in flight.
    pub fn begin_submit(&mut self, user_address: &str) -> Option<PendingSubmission> {
        if !self.can_submit() {
            debug!(
                prediction_id = self.prediction.id,
                phase = %self.phase,
                "Submit ignored"
            );
            return None;
        }
        let (choice, amount) = (self.choice?, self.amount?);
        let stake = match Stake::new(&self.prediction, user_address, amount, choice) {
            Ok(stake) => stake,
            Err(e) => {
                debug!(error = %e, "Submit ignored");
                return None;
            }
        };

        self.attempt += 1;
        self.phase = WagerPhase::Submitting;
        self.receipt = None;
        self.failure = None;
        debug!(prediction_id = stake.prediction_id, attempt = self.attempt, "Submitting stake");
        Some(PendingSubmission {
            attempt: self.attempt,
            stake,
        })
    }

    /// Apply the result of a submission attempt.
    ///
    /// Ignored (returns false) unless the session is still submitting that
    /// exact attempt.
    pub fn settle(&mut self, attempt: u64, result: Result<SubmissionReceipt, StoreError>) -> bool {
        if self.phase != WagerPhase::Submitting || attempt != self.attempt {
            debug!(
                attempt,
                current = self.attempt,
                phase = %self.phase,
                "Discarding stale submission result"
            );
            return false;
        }
        match result {
            Ok(receipt) => {
                info!(prediction_id = self.prediction.id, attempt, "Stake confirmed");
                self.receipt = Some(receipt);
                self.phase = WagerPhase::Confirmed;
            }
            Err(e) => {
                warn!(prediction_id = self.prediction.id, attempt, error = %e, "Stake failed");
                self.failure = Some(e.to_string());
                self.phase = WagerPhase::Failed;
            }
        }
        true
    }

    /// Abandon the in-flight attempt. Its result will be discarded.
    pub fn cancel(&mut self) -> bool {
        if self.phase != WagerPhase::Submitting {
            return false;
        }
        self.attempt += 1;
        self.phase = WagerPhase::AmountEntered;
        true
    }

    /// Go back from `Failed` to `AmountEntered`, keeping the input.
    pub fn retry(&mut self) -> bool {
        if self.phase != WagerPhase::Failed {
            return false;
        }
        self.failure = None;
        self.phase = WagerPhase::AmountEntered;
        true
    }

    /// Clear the session for a new wager. Not allowed mid-submission.
    pub fn reset(&mut self) -> bool {
        if self.phase == WagerPhase::Submitting {
            return false;
        }
        self.phase = WagerPhase::Idle;
        self.choice = None;
        self.amount_input.clear();
        self.amount = None;
        self.receipt = None;
        self.failure = None;
        true
    }

    /// Submit inline through `store`, using the wallet's primary address.
    ///
    /// `None` means nothing was sent: no logged-in wallet, or the session
    /// is not ready to submit.
    pub async fn submit<A: PredictionApi>(
        &mut self,
        store: &PredictionStore<A>,
        wallet: &dyn WalletProvider,
    ) -> Option<Result<SubmissionReceipt, StoreError>> {
        let address = wallet.primary_address()?;
        let pending = self.begin_submit(&address)?;
        let result = store.submit_stake(&pending.stake).await;
        self.settle(pending.attempt, result.clone());
        Some(result)
    }

    /// Submit on a background task. Settle the session with
    /// [`SubmissionTask::join`]'s output.
    pub fn dispatch<A: PredictionApi + 'static>(
        &mut self,
        store: Arc<PredictionStore<A>>,
        wallet: &dyn WalletProvider,
    ) -> Option<SubmissionTask> {
        let address = wallet.primary_address()?;
        let pending = self.begin_submit(&address)?;
        Some(SubmissionTask::spawn(store, pending))
    }
}

// ---------------------------------------------------------------------------
// Background submission
// ---------------------------------------------------------------------------

/// A stake submission running on its own task.
pub struct SubmissionTask {
    attempt: u64,
    handle: JoinHandle<Result<SubmissionReceipt, StoreError>>,
}

impl SubmissionTask {
    pub fn spawn<A: PredictionApi + 'static>(
        store: Arc<PredictionStore<A>>,
        pending: PendingSubmission,
    ) -> Self {
        let attempt = pending.attempt;
        let handle = tokio::spawn(async move { store.submit_stake(&pending.stake).await });
        Self { attempt, handle }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task. Returns the attempt id with the result so the
    /// caller can pass both to [`WagerSession::settle`].
    pub async fn join(self) -> (u64, Result<SubmissionReceipt, StoreError>) {
        let result = match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(StoreError::Cancelled),
            Err(e) => Err(StoreError::Transport(format!("Submission task failed: {e}"))),
        };
        (self.attempt, result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
