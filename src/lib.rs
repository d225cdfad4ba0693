//! PolyLedger Library
//!
//! Ledger metrics reconciliation and tax estimation for the PolyBot
//! prediction-market dashboard

pub mod config;
pub mod ledger;
pub mod metrics;
pub mod persistence;
pub mod tax;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
