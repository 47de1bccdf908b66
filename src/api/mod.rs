//! Backend transport.
//!
//! Defines the `PredictionApi` trait the store talks to and provides the
//! reqwest implementation of the REST contract:
//!
//! | Method | Path               | Body                        |
//! |--------|--------------------|-----------------------------|
//! | GET    | `/predictions`     | none                        |
//! | POST   | `/predictions/ai`  | `{ "asset": .. }`           |
//! | POST   | `/predictions/kol` | prediction without `id`     |
//! | POST   | `/support`         | stake                       |

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::{Prediction, PredictionDraft, Stake, SubmissionReceipt};

/// Abstraction over the prediction backend.
///
/// Implementations return entities that have already passed ingestion
/// validation; records that fail it never reach the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionApi: Send + Sync {
    /// Fetch every prediction, in server order.
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>>;

    /// Ask the backend to generate an AI prediction for `asset`.
    async fn create_ai_prediction(&self, asset: &str) -> Result<Prediction>;

    /// Publish a KOL prediction.
    async fn create_kol_prediction(&self, draft: &PredictionDraft) -> Result<Prediction>;

    /// Forward a stake.
    async fn submit_stake(&self, stake: &Stake) -> Result<SubmissionReceipt>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Lets a store and its caller share one backend handle.
#[async_trait]
impl<T: PredictionApi + ?Sized> PredictionApi for Arc<T> {
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>> {
        (**self).fetch_predictions().await
    }

    async fn create_ai_prediction(&self, asset: &str) -> Result<Prediction> {
        (**self).create_ai_prediction(asset).await
    }

    async fn create_kol_prediction(&self, draft: &PredictionDraft) -> Result<Prediction> {
        (**self).create_kol_prediction(draft).await
    }

    async fn submit_stake(&self, stake: &Stake) -> Result<SubmissionReceipt> {
        (**self).submit_stake(stake).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
