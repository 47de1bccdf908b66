//! Read-side views over a prediction list.
//!
//! Nothing here mutates the store or caches derived values; every figure
//! is recomputed from the prediction and the caller's clock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::types::{MarketData, Prediction, PredictionId, PredictionKind, PredictorType};

const MS_PER_DAY: i64 = 86_400_000;
const BAR_CELLS: usize = 10;

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Predictions authored by `predictor_type`, in collection order.
pub fn by_predictor_type(list: &[Prediction], predictor_type: PredictorType) -> Vec<&Prediction> {
    list.iter()
        .filter(|p| p.predictor_type == predictor_type)
        .collect()
}

/// The collection split by author type. Both halves keep collection order.
#[derive(Debug, Default, PartialEq)]
pub struct Partition<'a> {
    pub ai: Vec<&'a Prediction>,
    pub kol: Vec<&'a Prediction>,
}

impl<'a> Partition<'a> {
    pub fn get(&self, predictor_type: PredictorType) -> &[&'a Prediction] {
        match predictor_type {
            PredictorType::Ai => &self.ai,
            PredictorType::Kol => &self.kol,
        }
    }

    pub fn len(&self) -> usize {
        self.ai.len() + self.kol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn partition(list: &[Prediction]) -> Partition<'_> {
    let mut out = Partition::default();
    for p in list {
        match p.predictor_type {
            PredictorType::Ai => out.ai.push(p),
            PredictorType::Kol => out.kol.push(p),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

/// Whole days until `end`, floored, never negative. Zero without an end.
pub fn time_remaining_days(end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let Some(end) = end else {
        return 0;
    };
    let ms = (end - now).num_milliseconds();
    ms.div_euclid(MS_PER_DAY).max(0)
}

/// Width of the confidence bar as a percentage of its track.
pub fn confidence_bar_width_percent(confidence: f64) -> f64 {
    (confidence * 100.0).clamp(0.0, 100.0)
}

/// `$1,234.50` style; negative amounts get a leading minus.
pub fn format_usd(amount: Decimal) -> String {
    let rounded = format!("{:.2}", amount.abs().round_dp(2));
    let (whole, cents) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount.is_sign_negative() && !amount.round_dp(2).is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}${grouped}.{cents}")
}

/// Signed percentage with one decimal, e.g. `+10.0%`.
pub fn format_percent(percent: Decimal) -> String {
    let rounded = percent.round_dp(1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("{rounded:.1}%")
    } else {
        format!("+{:.1}%", rounded.abs())
    }
}

fn format_signed_f64(percent: f64) -> String {
    Decimal::from_f64_retain(percent)
        .map(format_percent)
        .unwrap_or_else(|| "n/a".to_string())
}

/// Outcome price in cents, e.g. `25¢`.
pub fn format_cents(price: Decimal) -> String {
    format!("{}¢", (price * Decimal::ONE_HUNDRED).round_dp(1).normalize())
}

fn confidence_bar(confidence: f64) -> String {
    let filled = (confidence_bar_width_percent(confidence) / 100.0 * BAR_CELLS as f64).round() as usize;
    let filled = filled.min(BAR_CELLS);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(BAR_CELLS - filled))
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CardBody {
    Forecast {
        current_price: Decimal,
        predicted_price: Decimal,
        change_percent: Decimal,
        bullish: bool,
        market_data: Option<MarketData>,
    },
    Market {
        question: String,
        yes_price: Decimal,
        no_price: Decimal,
        liquidity: Decimal,
        days_remaining: i64,
    },
}

/// Display-ready view of one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionCard {
    pub id: PredictionId,
    pub headline: String,
    pub predictor: &'static str,
    pub confidence_percent: f64,
    pub reasoning: String,
    pub supporters: Option<u64>,
    pub total_support: Option<Decimal>,
    pub body: CardBody,
}

impl PredictionCard {
    pub fn build(prediction: &Prediction, now: DateTime<Utc>) -> Self {
        let (headline, body) = match &prediction.kind {
            PredictionKind::PriceForecast(f) => (
                format!("{}/USD", prediction.asset),
                CardBody::Forecast {
                    current_price: f.current_price,
                    predicted_price: f.predicted_price,
                    change_percent: f.price_change_percent(),
                    bullish: f.is_bullish(),
                    market_data: f.market_data.clone(),
                },
            ),
            PredictionKind::BinaryMarket(m) => (
                m.question.clone(),
                CardBody::Market {
                    question: m.question.clone(),
                    yes_price: m.yes_price,
                    no_price: m.no_price,
                    liquidity: m.total_liquidity,
                    days_remaining: time_remaining_days(m.end_time, now),
                },
            ),
        };

        Self {
            id: prediction.id,
            headline,
            predictor: prediction.predictor_type.label(),
            confidence_percent: confidence_bar_width_percent(prediction.confidence),
            reasoning: prediction.reasoning.clone(),
            supporters: prediction.supporters_count,
            total_support: prediction.total_support,
            body,
        }
    }

    pub fn build_all(list: &[Prediction], now: DateTime<Utc>) -> Vec<Self> {
        list.iter().map(|p| Self::build(p, now)).collect()
    }
}

impl fmt::Display for PredictionCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#{} {}  [{}]", self.id, self.headline, self.predictor)?;
        match &self.body {
            CardBody::Forecast {
                current_price,
                predicted_price,
                change_percent,
                bullish,
                market_data,
            } => {
                let arrow = if *bullish { "up" } else { "down" };
                writeln!(
                    f,
                    "    {} -> {} ({}, {arrow})",
                    format_usd(*current_price),
                    format_usd(*predicted_price),
                    format_percent(*change_percent),
                )?;
                if let Some(md) = market_data {
                    writeln!(
                        f,
                        "    24h volume {} | market cap {} | 24h {} | 7d {}",
                        format_usd(md.volume_24h),
                        format_usd(md.market_cap),
                        format_signed_f64(md.percent_change_24h),
                        format_signed_f64(md.percent_change_7d),
                    )?;
                }
            }
            CardBody::Market {
                yes_price,
                no_price,
                liquidity,
                days_remaining,
                ..
            } => {
                writeln!(
                    f,
                    "    YES {} | NO {} | liquidity {} | {}d left",
                    format_cents(*yes_price),
                    format_cents(*no_price),
                    format_usd(*liquidity),
                    days_remaining,
                )?;
            }
        }
        write!(
            f,
            "    confidence {} {:.0}%",
            confidence_bar(self.confidence_percent / 100.0),
            self.confidence_percent
        )?;
        if let Some(count) = self.supporters {
            write!(f, " | {count} supporters")?;
        }
        if let Some(total) = self.total_support {
            write!(f, " | {} staked", format_usd(total))?;
        }
        if !self.reasoning.is_empty() {
            write!(f, "\n    {}", self.reasoning)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
