//! Quote lookup abstractions

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMatch {
    pub symbol: String,
    pub name: String,
}

/// Cache identity of a provider request: `(operation, ticker[, date])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuoteKey {
    Search(String),
    Price(String),
    Historical(String, NaiveDate),
    ThreeMonth(String),
}

impl Display for QuoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuoteKey::Search(q) => write!(f, "search_{q}"),
            QuoteKey::Price(t) => write!(f, "price_{t}"),
            QuoteKey::Historical(t, d) => write!(f, "hist_{t}_{d}"),
            QuoteKey::ThreeMonth(t) => write!(f, "3m_{t}"),
        }
    }
}

/// Market data lookups. Implementations never fail: an unknown ticker and
/// an unreachable provider both come back as `None` (or an empty list).
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn search_tickers(&self, query: &str) -> Vec<TickerMatch>;

    async fn current_price(&self, ticker: &str) -> Option<f64>;

    /// First close on or after `date` within a week, else the latest close
    /// before it.
    async fn historical_price(&self, ticker: &str, date: NaiveDate) -> Option<f64>;

    /// Percent change across the trailing three months, two decimals.
    async fn three_month_return(&self, ticker: &str) -> Option<Decimal>;
}

/// Returns the search result whose symbol is exactly `ticker`.
pub async fn validate_ticker(provider: &dyn QuoteProvider, ticker: &str) -> Option<TickerMatch> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return None;
    }
    provider
        .search_tickers(ticker)
        .await
        .into_iter()
        .find(|m| m.symbol.eq_ignore_ascii_case(ticker))
}
