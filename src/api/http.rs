//! REST client for the PredictX backend.
//!
//! Base URL comes from configuration (`http://localhost:8000` by default).
//! Auth: none. The wallet address travels inside the stake body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PredictionApi;
use crate::types::{Prediction, PredictionDraft, Stake, SubmissionReceipt, WirePrediction};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const BACKEND_NAME: &str = "predictx-rest";
const USER_AGENT: &str = "PredictX/0.1.0 (prediction-client)";

#[derive(Debug, Serialize)]
struct CreateAiRequest<'a> {
    asset: &'a str,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP implementation of [`PredictionApi`].
pub struct HttpPredictionApi {
    http: Client,
    base_url: String,
}

impl HttpPredictionApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for PredictX backend")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;
        Self::read_json(resp, path).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let resp = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} request failed"))?;
        Self::read_json(resp, path).await
    }

    async fn read_json<T: DeserializeOwned>(resp: Response, path: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("PredictX API error on {path}: {status}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {path} response"))
    }

    /// Decode and validate a fetched batch row by row. Rows that fail
    /// either step are dropped with a warning; the rest are kept.
    fn ingest_batch(raw: Vec<Value>) -> Vec<Prediction> {
        let total = raw.len();
        let predictions: Vec<Prediction> = raw
            .into_iter()
            .filter_map(|row| {
                let wire = match serde_json::from_value::<WirePrediction>(row) {
                    Ok(wire) => wire,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed prediction");
                        return None;
                    }
                };
                match Prediction::try_from(wire) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(error = %e, "Dropping invalid prediction");
                        None
                    }
                }
            })
            .collect();

        if predictions.len() < total {
            warn!(
                kept = predictions.len(),
                dropped = total - predictions.len(),
                "Some predictions failed validation"
            );
        }
        predictions
    }

    fn ingest_one(wire: WirePrediction, path: &str) -> Result<Prediction> {
        Prediction::try_from(wire).with_context(|| format!("Invalid prediction returned by {path}"))
    }
}

// ---------------------------------------------------------------------------
// PredictionApi trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PredictionApi for HttpPredictionApi {
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>> {
        let raw: Vec<Value> = self.get_json("/predictions").await?;
        let predictions = Self::ingest_batch(raw);
        debug!(count = predictions.len(), "Predictions fetched");
        Ok(predictions)
    }

    async fn create_ai_prediction(&self, asset: &str) -> Result<Prediction> {
        let path = "/predictions/ai";
        let wire: WirePrediction = self.post_json(path, &CreateAiRequest { asset }).await?;
        let prediction = Self::ingest_one(wire, path)?;
        info!(id = prediction.id, asset = %prediction.asset, "AI prediction generated");
        Ok(prediction)
    }

    async fn create_kol_prediction(&self, draft: &PredictionDraft) -> Result<Prediction> {
        let path = "/predictions/kol";
        draft.validate().context("Refusing to publish invalid KOL prediction")?;
        let wire: WirePrediction = self.post_json(path, &draft.to_wire()).await?;
        let prediction = Self::ingest_one(wire, path)?;
        info!(id = prediction.id, asset = %prediction.asset, "KOL prediction published");
        Ok(prediction)
    }

    async fn submit_stake(&self, stake: &Stake) -> Result<SubmissionReceipt> {
        let receipt: SubmissionReceipt = self.post_json("/support", stake).await?;
        info!(
            prediction_id = stake.prediction_id,
            choice = %stake.choice,
            amount = %stake.amount,
            "Stake submitted"
        );
        Ok(receipt)
    }

    fn name(&self) -> &str {
        BACKEND_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
