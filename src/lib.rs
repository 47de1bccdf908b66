//! PredictX: prediction-market client engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod config;
pub mod payout;
pub mod projection;
pub mod store;
pub mod types;
pub mod wager;
pub mod wallet;
