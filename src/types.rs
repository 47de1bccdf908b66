//! Shared types for the PredictX client engine.
//!
//! Predictions arrive from the backend as loosely shaped JSON in which the
//! kind-specific fields are simply present or absent. They are validated
//! once at this boundary and turned into a tagged [`PredictionKind`], so
//! payout math and display code never have to guess which fields exist.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payout;

/// Server-assigned prediction identifier.
pub type PredictionId = u64;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Who authored a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictorType {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "KOL")]
    Kol,
}

impl PredictorType {
    pub const ALL: &'static [PredictorType] = &[PredictorType::Ai, PredictorType::Kol];

    /// Card label shown next to the headline.
    pub fn label(&self) -> &'static str {
        match self {
            PredictorType::Ai => "AI Prediction",
            PredictorType::Kol => "KOL Prediction",
        }
    }
}

impl fmt::Display for PredictorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictorType::Ai => write!(f, "AI"),
            PredictorType::Kol => write!(f, "KOL"),
        }
    }
}

impl std::str::FromStr for PredictorType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ai" => Ok(PredictorType::Ai),
            "kol" => Ok(PredictorType::Kol),
            _ => Err(anyhow::anyhow!("Unknown predictor type: {s}")),
        }
    }
}

/// Outcome of a binary market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Spot market statistics attached to a price forecast.
///
/// The backend sends these keys in snake_case, unlike the rest of the
/// prediction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    pub volume_24h: Decimal,
    pub market_cap: Decimal,
    #[serde(default)]
    pub percent_change_1h: f64,
    #[serde(default)]
    pub percent_change_24h: f64,
    #[serde(default)]
    pub percent_change_7d: f64,
}

// ---------------------------------------------------------------------------
// Prediction
// ---------------------------------------------------------------------------

/// A forecast of an asset's future price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceForecast {
    pub current_price: Decimal,
    pub predicted_price: Decimal,
    pub market_data: Option<MarketData>,
}

impl PriceForecast {
    /// Absolute predicted move.
    pub fn price_change(&self) -> Decimal {
        self.predicted_price - self.current_price
    }

    /// Predicted move as a percentage of the current price.
    pub fn price_change_percent(&self) -> Decimal {
        payout::price_change_percent(self.current_price, self.predicted_price)
    }

    pub fn is_bullish(&self) -> bool {
        self.price_change() >= Decimal::ZERO
    }
}

/// A yes/no market with priced outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMarket {
    pub question: String,
    /// Absent when the backend sends no `endTimestamp`.
    pub end_time: Option<DateTime<Utc>>,
    /// Price of YES (0–1). Need not sum to 1 with `no_price`.
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub total_liquidity: Decimal,
}

impl BinaryMarket {
    pub fn outcome_price(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::Yes => self.yes_price,
            Outcome::No => self.no_price,
        }
    }

    /// Whether the market is still open at `now`. A market without an
    /// end time never closes.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.end_time.map_or(true, |end| end > now)
    }
}

/// Kind-specific half of a prediction. Built once at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionKind {
    PriceForecast(PriceForecast),
    BinaryMarket(BinaryMarket),
}

impl PredictionKind {
    pub fn name(&self) -> &'static str {
        match self {
            PredictionKind::PriceForecast(_) => "price forecast",
            PredictionKind::BinaryMarket(_) => "binary market",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, PredictionKind::BinaryMarket(_))
    }
}

/// A validated prediction as held by the store.
///
/// (De)serialises through [`WirePrediction`], so deserialising a
/// `Prediction` directly enforces every invariant checked at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePrediction", into = "WirePrediction")]
pub struct Prediction {
    pub id: PredictionId,
    pub asset: String,
    pub predictor_type: PredictorType,
    /// Author confidence in [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    pub supporters_count: Option<u64>,
    pub total_support: Option<Decimal>,
    pub kind: PredictionKind,
}

impl Prediction {
    pub fn as_forecast(&self) -> Option<&PriceForecast> {
        match &self.kind {
            PredictionKind::PriceForecast(f) => Some(f),
            PredictionKind::BinaryMarket(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryMarket> {
        match &self.kind {
            PredictionKind::BinaryMarket(m) => Some(m),
            PredictionKind::PriceForecast(_) => None,
        }
    }

    /// Outcome price for binary markets; `None` for forecasts.
    pub fn outcome_price(&self, outcome: Outcome) -> Option<Decimal> {
        self.as_binary().map(|m| m.outcome_price(outcome))
    }

    /// Short label used in logs and error messages.
    pub fn record_label(&self) -> String {
        record_label(Some(self.id), &self.asset)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredictionKind::PriceForecast(p) => write!(
                f,
                "[#{} {}] {}/USD {:.2} -> {:.2} ({:+.1}%) conf={:.0}%",
                self.id,
                self.predictor_type,
                self.asset,
                p.current_price,
                p.predicted_price,
                p.price_change_percent(),
                self.confidence * 100.0,
            ),
            PredictionKind::BinaryMarket(m) => write!(
                f,
                "[#{} {}] {}: {} (YES: {:.0}¢ | NO: {:.0}¢ | liq: ${:.0})",
                self.id,
                self.predictor_type,
                self.asset,
                m.question,
                m.yes_price * Decimal::ONE_HUNDRED,
                m.no_price * Decimal::ONE_HUNDRED,
                m.total_liquidity,
            ),
        }
    }
}

/// A prediction that has not been assigned an id yet (KOL submissions).
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionDraft {
    pub asset: String,
    pub predictor_type: PredictorType,
    pub confidence: f64,
    pub reasoning: String,
    pub kind: PredictionKind,
}

impl PredictionDraft {
    /// Check the same invariants a received prediction must satisfy.
    pub fn validate(&self) -> Result<(), ModelError> {
        let record = record_label(None, &self.asset);
        check_confidence(&record, self.confidence)?;
        check_kind(&record, &self.kind)
    }

    pub fn to_wire(&self) -> WirePrediction {
        let mut wire = WirePrediction {
            id: None,
            asset: self.asset.clone(),
            predictor_type: self.predictor_type,
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
            ..WirePrediction::default()
        };
        wire.set_kind(&self.kind);
        wire
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Prediction exactly as the REST backend sends it: every kind-specific
/// field optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePrediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PredictionId>,
    pub asset: String,
    pub predictor_type: PredictorType,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_data: Option<MarketData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_liquidity: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supporters_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_support: Option<Decimal>,
}

impl Default for WirePrediction {
    fn default() -> Self {
        Self {
            id: None,
            asset: String::new(),
            predictor_type: PredictorType::Ai,
            confidence: 0.0,
            reasoning: String::new(),
            current_price: None,
            predicted_price: None,
            market_data: None,
            question: None,
            end_timestamp: None,
            yes_price: None,
            no_price: None,
            total_liquidity: None,
            supporters_count: None,
            total_support: None,
        }
    }
}

impl WirePrediction {
    fn set_kind(&mut self, kind: &PredictionKind) {
        match kind {
            PredictionKind::PriceForecast(p) => {
                self.current_price = Some(p.current_price);
                self.predicted_price = Some(p.predicted_price);
                self.market_data = p.market_data.clone();
            }
            PredictionKind::BinaryMarket(m) => {
                self.question = Some(m.question.clone());
                self.end_timestamp = m.end_time.map(|end| end.timestamp_millis());
                self.yes_price = Some(m.yes_price);
                self.no_price = Some(m.no_price);
                self.total_liquidity = Some(m.total_liquidity);
            }
        }
    }

    /// Decide the kind tag. A complete binary field set wins over the
    /// forecast fields, which binary records may also carry.
    fn take_kind(&mut self, record: &str) -> Result<PredictionKind, ModelError> {
        if let (Some(question), Some(yes_price), Some(no_price)) =
            (self.question.take(), self.yes_price, self.no_price)
        {
            let end_time = match self.end_timestamp {
                Some(end_ms) => Some(Utc.timestamp_millis_opt(end_ms).single().ok_or_else(|| {
                    ModelError::InvalidEndTimestamp {
                        record: record.to_string(),
                        value: end_ms,
                    }
                })?),
                None => None,
            };
            return Ok(PredictionKind::BinaryMarket(BinaryMarket {
                question,
                end_time,
                yes_price,
                no_price,
                total_liquidity: self.total_liquidity.unwrap_or(Decimal::ZERO),
            }));
        }

        match (self.current_price, self.predicted_price) {
            (Some(current_price), Some(predicted_price)) => {
                Ok(PredictionKind::PriceForecast(PriceForecast {
                    current_price,
                    predicted_price,
                    market_data: self.market_data.take(),
                }))
            }
            _ => Err(ModelError::MissingKindFields {
                record: record.to_string(),
            }),
        }
    }
}

impl TryFrom<WirePrediction> for Prediction {
    type Error = ModelError;

    fn try_from(mut wire: WirePrediction) -> Result<Self, Self::Error> {
        let record = record_label(wire.id, &wire.asset);
        let id = wire.id.ok_or_else(|| ModelError::MissingId {
            record: record.clone(),
        })?;
        check_confidence(&record, wire.confidence)?;
        let kind = wire.take_kind(&record)?;
        check_kind(&record, &kind)?;
        if let Some(total) = wire.total_support {
            check_non_negative(&record, "totalSupport", total)?;
        }

        Ok(Prediction {
            id,
            asset: wire.asset,
            predictor_type: wire.predictor_type,
            confidence: wire.confidence,
            reasoning: wire.reasoning,
            supporters_count: wire.supporters_count,
            total_support: wire.total_support,
            kind,
        })
    }
}

impl From<Prediction> for WirePrediction {
    fn from(p: Prediction) -> Self {
        let mut wire = WirePrediction {
            id: Some(p.id),
            asset: p.asset,
            predictor_type: p.predictor_type,
            confidence: p.confidence,
            reasoning: p.reasoning,
            supporters_count: p.supporters_count,
            total_support: p.total_support,
            ..WirePrediction::default()
        };
        wire.set_kind(&p.kind);
        wire
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

fn record_label(id: Option<PredictionId>, asset: &str) -> String {
    match id {
        Some(id) => format!("#{id} ({asset})"),
        None => format!("<new> ({asset})"),
    }
}

fn check_confidence(record: &str, value: f64) -> Result<(), ModelError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ModelError::ConfidenceOutOfRange {
            record: record.to_string(),
            value,
        })
    }
}

fn check_non_negative(record: &str, field: &'static str, value: Decimal) -> Result<(), ModelError> {
    if value < Decimal::ZERO {
        return Err(ModelError::Negative {
            record: record.to_string(),
            field,
            value,
        });
    }
    Ok(())
}

fn check_unit_price(record: &str, field: &'static str, value: Decimal) -> Result<(), ModelError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ModelError::PriceOutOfRange {
            record: record.to_string(),
            field,
            value,
        });
    }
    Ok(())
}

fn check_kind(record: &str, kind: &PredictionKind) -> Result<(), ModelError> {
    match kind {
        PredictionKind::PriceForecast(p) => {
            if p.current_price <= Decimal::ZERO {
                return Err(ModelError::NonPositive {
                    record: record.to_string(),
                    field: "currentPrice",
                    value: p.current_price,
                });
            }
            check_non_negative(record, "predictedPrice", p.predicted_price)?;
            if let Some(md) = &p.market_data {
                check_non_negative(record, "volume_24h", md.volume_24h)?;
                check_non_negative(record, "market_cap", md.market_cap)?;
            }
            Ok(())
        }
        PredictionKind::BinaryMarket(m) => {
            check_unit_price(record, "yesPrice", m.yes_price)?;
            check_unit_price(record, "noPrice", m.no_price)?;
            check_non_negative(record, "totalLiquidity", m.total_liquidity)
        }
    }
}

// ---------------------------------------------------------------------------
// Stake
// ---------------------------------------------------------------------------

/// Which side of a prediction a stake backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeChoice {
    /// Price forecasts: back (`true`) or oppose (`false`) the author.
    SupportAi(bool),
    /// Binary markets.
    Outcome(Outcome),
}

impl StakeChoice {
    /// Whether this choice applies to the given kind of prediction.
    pub fn fits(&self, kind: &PredictionKind) -> bool {
        matches!(
            (self, kind),
            (StakeChoice::SupportAi(_), PredictionKind::PriceForecast(_))
                | (StakeChoice::Outcome(_), PredictionKind::BinaryMarket(_))
        )
    }
}

impl fmt::Display for StakeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeChoice::SupportAi(true) => write!(f, "SUPPORT"),
            StakeChoice::SupportAi(false) => write!(f, "OPPOSE"),
            StakeChoice::Outcome(o) => write!(f, "{o}"),
        }
    }
}

/// A wager intent, built client-side and sent to `/support`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "StakeRequest")]
pub struct Stake {
    pub prediction_id: PredictionId,
    pub user_address: String,
    pub amount: Decimal,
    pub choice: StakeChoice,
}

impl Stake {
    pub fn new(
        prediction: &Prediction,
        user_address: impl Into<String>,
        amount: Decimal,
        choice: StakeChoice,
    ) -> Result<Self, ModelError> {
        if amount <= Decimal::ZERO {
            return Err(ModelError::NonPositiveStake(amount));
        }
        if !choice.fits(&prediction.kind) {
            return Err(ModelError::ChoiceMismatch {
                kind: prediction.kind.name(),
            });
        }
        Ok(Self {
            prediction_id: prediction.id,
            user_address: user_address.into(),
            amount,
            choice,
        })
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} on #{} from {}",
            self.choice, self.amount, self.prediction_id, self.user_address,
        )
    }
}

/// Body of `POST /support`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StakeRequest {
    prediction_id: PredictionId,
    user_address: String,
    amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    support_ai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<Outcome>,
}

impl From<Stake> for StakeRequest {
    fn from(s: Stake) -> Self {
        let (support_ai, outcome) = match s.choice {
            StakeChoice::SupportAi(v) => (Some(v), None),
            StakeChoice::Outcome(o) => (None, Some(o)),
        };
        StakeRequest {
            prediction_id: s.prediction_id,
            user_address: s.user_address,
            amount: s.amount,
            support_ai,
            outcome,
        }
    }
}

/// Whatever the backend returns for an accepted stake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionReceipt(pub serde_json::Value);

impl SubmissionReceipt {
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl fmt::Display for SubmissionReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Data that violates the entity invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Prediction {record}: missing id")]
    MissingId { record: String },

    #[error("Prediction {record}: neither price-forecast nor binary-market fields are populated")]
    MissingKindFields { record: String },

    #[error("Prediction {record}: confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { record: String, value: f64 },

    #[error("Prediction {record}: {field} must be positive, got {value}")]
    NonPositive {
        record: String,
        field: &'static str,
        value: Decimal,
    },

    #[error("Prediction {record}: {field} must not be negative, got {value}")]
    Negative {
        record: String,
        field: &'static str,
        value: Decimal,
    },

    #[error("Prediction {record}: {field} {value} is outside [0, 1]")]
    PriceOutOfRange {
        record: String,
        field: &'static str,
        value: Decimal,
    },

    #[error("Prediction {record}: end timestamp {value} is out of range")]
    InvalidEndTimestamp { record: String, value: i64 },

    #[error("Stake amount must be positive, got {0}")]
    NonPositiveStake(Decimal),

    #[error("Stake choice does not apply to a {kind}")]
    ChoiceMismatch { kind: &'static str },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
