//! HTTP data provider client for the market data sync engine.

pub mod client;

pub use client::{HttpDailyBarClient, DEFAULT_REQUESTS_PER_MINUTE, DEFAULT_TIMEOUT_SECS};
