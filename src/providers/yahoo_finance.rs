use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::cache::Cache;
use crate::core::config::CacheTtlConfig;
use crate::core::quote::{QuoteKey, QuoteProvider, TickerMatch};
use crate::core::returns::series_change;
use crate::providers::relay::Transport;

const SEARCH_LIMIT: usize = 8;
const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 7 * DAY_SECS;
const PRICE_WINDOW_SECS: i64 = 2 * DAY_SECS;
const THREE_MONTH_SECS: i64 = 90 * DAY_SECS;

#[derive(Deserialize, Debug)]
struct SearchResponse {
    quotes: Option<Vec<SearchQuote>>,
}

#[derive(Deserialize, Debug)]
struct SearchQuote {
    symbol: Option<String>,
    shortname: Option<String>,
    longname: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Option<ChartResult>,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    #[serde(alias = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    /// Exchange offset from UTC in seconds.
    gmtoffset: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Option<Vec<Quote>>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

impl ChartItem {
    /// Daily bars with a usable close, in timestamp order.
    fn bars(&self) -> Vec<(i64, f64)> {
        let closes = self
            .indicators
            .as_ref()
            .and_then(|inds| inds.quote.as_ref())
            .and_then(|quotes| quotes.first())
            .and_then(|q| q.close.as_ref());

        match (self.timestamp.as_ref(), closes) {
            (Some(timestamps), Some(closes)) => timestamps
                .iter()
                .zip(closes)
                .filter_map(|(ts, close)| (*close).filter(|c| c.is_finite()).map(|c| (*ts, c)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn market_price(&self) -> Option<f64> {
        self.meta.as_ref().and_then(|m| m.regular_market_price)
    }

    fn gmt_offset(&self) -> i64 {
        self.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0)
    }
}

/// Close of the first bar in `[start, start + 1 week)`, else the latest close
/// strictly before `start`.
fn close_on_or_after(bars: &[(i64, f64)], start: i64) -> Option<f64> {
    bars.iter()
        .find(|(ts, _)| *ts >= start && *ts < start + WEEK_SECS)
        .or_else(|| bars.iter().rev().find(|(ts, _)| *ts < start))
        .map(|(_, close)| *close)
}

fn positive(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// Yahoo Finance search and chart lookups over a pluggable transport, with
/// raw responses cached per [`QuoteKey`].
pub struct YahooQuoteProvider {
    base_url: String,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn Cache<QuoteKey, Value>>,
    ttl: CacheTtlConfig,
}

impl YahooQuoteProvider {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn Cache<QuoteKey, Value>>,
        ttl: CacheTtlConfig,
    ) -> Self {
        YahooQuoteProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            cache,
            ttl,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, key: QuoteKey, url: &str) -> Result<T> {
        let raw = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let value = self.transport.get_json(url).await?;
                let ttl = self.ttl.ttl_for(&key);
                self.cache.put(key, value.clone(), Some(ttl)).await;
                value
            }
        };
        Ok(serde_json::from_value(raw)?)
    }

    async fn chart(&self, key: QuoteKey, ticker: &str, period1: i64, period2: i64) -> Option<ChartItem> {
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            urlencoding::encode(ticker),
            period1,
            period2
        );

        match self.fetch::<ChartResponse>(key.clone(), &url).await {
            Ok(response) => {
                let item = response
                    .chart
                    .and_then(|c| c.result)
                    .and_then(|items| items.into_iter().next());
                if item.is_none() {
                    debug!("No chart data for {}", ticker);
                    self.cache.remove(&key).await;
                }
                item
            }
            Err(e) => {
                warn!("Chart request for {} failed: {:#}", ticker, e);
                None
            }
        }
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    #[instrument(name = "YahooSearch", skip(self))]
    async fn search_tickers(&self, query: &str) -> Vec<TickerMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount={}&newsCount=0",
            self.base_url,
            urlencoding::encode(query),
            SEARCH_LIMIT
        );
        let response = match self
            .fetch::<SearchResponse>(QuoteKey::Search(query.to_string()), &url)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Ticker search for '{}' failed: {:#}", query, e);
                return Vec::new();
            }
        };

        response
            .quotes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|quote| {
                let symbol = quote.symbol.filter(|s| !s.is_empty())?;
                let name = quote
                    .shortname
                    .or(quote.longname)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| symbol.clone());
                Some(TickerMatch { symbol, name })
            })
            .take(SEARCH_LIMIT)
            .collect()
    }

    #[instrument(name = "YahooCurrentPrice", skip(self))]
    async fn current_price(&self, ticker: &str) -> Option<f64> {
        let now = Utc::now().timestamp();
        let item = self
            .chart(
                QuoteKey::Price(ticker.to_string()),
                ticker,
                now - PRICE_WINDOW_SECS,
                now,
            )
            .await?;

        item.market_price()
            .and_then(positive)
            .or_else(|| item.bars().last().and_then(|(_, close)| positive(*close)))
    }

    #[instrument(name = "YahooHistoricalPrice", skip(self))]
    async fn historical_price(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        let start = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
        let item = self
            .chart(
                QuoteKey::Historical(ticker.to_string(), date),
                ticker,
                start - WEEK_SECS,
                start + WEEK_SECS,
            )
            .await?;

        // daily bars are stamped at the exchange's open, which can fall on
        // the previous UTC day
        let local_start = start - item.gmt_offset();
        let price = close_on_or_after(&item.bars(), local_start);
        if price.is_none() {
            debug!("No close near {} for {}", date, ticker);
        }
        price
    }

    #[instrument(name = "YahooThreeMonthReturn", skip(self))]
    async fn three_month_return(&self, ticker: &str) -> Option<Decimal> {
        let now = Utc::now().timestamp();
        let item = self
            .chart(
                QuoteKey::ThreeMonth(ticker.to_string()),
                ticker,
                now - THREE_MONTH_SECS,
                now,
            )
            .await?;

        let closes: Vec<f64> = item.bars().into_iter().map(|(_, close)| close).collect();
        series_change(&closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::relay::DirectTransport;
    use crate::store::memory::MemoryCache;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> YahooQuoteProvider {
        YahooQuoteProvider::new(
            &server.uri(),
            Arc::new(DirectTransport::new().unwrap()),
            Arc::new(MemoryCache::<QuoteKey, Value>::new()),
            CacheTtlConfig::default(),
        )
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn chart_body(price: Option<f64>, timestamps: &[i64], closes: &[Option<f64>]) -> String {
        serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "regularMarketPrice": price, "currency": "USD" },
                    "timestamp": timestamps,
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        })
        .to_string()
    }

    async fn mount_chart(server: &MockServer, symbol: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{symbol}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_tickers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .and(query_param("q", "apple"))
            .and(query_param("quotesCount", "8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"quotes": [
                    {"symbol": "AAPL", "shortname": "Apple Inc.", "longname": "Apple Inc."},
                    {"symbol": "APLE", "longname": "Apple Hospitality REIT"},
                    {"symbol": "AAPL.MX"},
                    {"shortname": "no symbol"}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let results = provider(&server).search_tickers("apple").await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].symbol, "AAPL");
        assert_eq!(results[0].name, "Apple Inc.");
        assert_eq!(results[1].name, "Apple Hospitality REIT");
        assert_eq!(results[2].name, "AAPL.MX");
    }

    #[tokio::test]
    async fn test_unknown_ticker_search_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/finance/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"quotes": []}"#))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert!(provider.search_tickers("ZZZZNOTREAL").await.is_empty());
        assert!(provider.search_tickers("   ").await.is_empty());
    }

    #[tokio::test]
    async fn test_current_price_from_meta() {
        let server = MockServer::start().await;
        mount_chart(&server, "AAPL", chart_body(Some(195.0), &[1, 2], &[Some(190.0), Some(194.0)])).await;

        assert_eq!(provider(&server).current_price("AAPL").await, Some(195.0));
    }

    #[tokio::test]
    async fn test_current_price_falls_back_to_last_close() {
        let server = MockServer::start().await;
        mount_chart(&server, "AAPL", chart_body(None, &[1, 2, 3], &[Some(190.0), Some(191.5), None])).await;

        assert_eq!(provider(&server).current_price("AAPL").await, Some(191.5));
    }

    #[tokio::test]
    async fn test_weekend_date_uses_next_trading_day() {
        let server = MockServer::start().await;
        // Fri 2024-01-05, Mon 2024-01-08, Tue 2024-01-09 at 14:30 UTC
        mount_chart(
            &server,
            "AAPL",
            chart_body(
                Some(185.0),
                &[1704465000, 1704724200, 1704810600],
                &[Some(181.18), Some(185.56), Some(185.14)],
            ),
        )
        .await;

        let price = provider(&server)
            .historical_price("AAPL", date("2024-01-06"))
            .await;
        assert_eq!(price, Some(185.56));
    }

    #[tokio::test]
    async fn test_historical_falls_back_to_previous_close() {
        let server = MockServer::start().await;
        // Thu 2024-01-18, Fri 2024-01-19; nothing after Sat 2024-01-20
        mount_chart(
            &server,
            "AAPL",
            chart_body(
                Some(191.0),
                &[1705588200, 1705674600],
                &[Some(188.63), Some(191.56)],
            ),
        )
        .await;

        let price = provider(&server)
            .historical_price("AAPL", date("2024-01-20"))
            .await;
        assert_eq!(price, Some(191.56));
    }

    #[tokio::test]
    async fn test_three_month_return() {
        let server = MockServer::start().await;
        mount_chart(
            &server,
            "MSFT",
            chart_body(Some(110.0), &[1, 2, 3], &[Some(100.0), None, Some(110.0)]),
        )
        .await;

        assert_eq!(
            provider(&server).three_month_return("MSFT").await,
            Some(Decimal::new(1000, 2))
        );
    }

    #[tokio::test]
    async fn test_three_month_return_needs_two_closes() {
        let server = MockServer::start().await;
        mount_chart(&server, "NEW", chart_body(Some(10.0), &[1], &[Some(10.0)])).await;

        assert_eq!(provider(&server).three_month_return("NEW").await, None);
    }

    #[tokio::test]
    async fn test_historical_price_uses_exchange_day() {
        let server = MockServer::start().await;
        // ASX bars open at 10:00 AEDT, 23:00 UTC the day before
        let body = serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "regularMarketPrice": 46.5, "gmtoffset": 39600 },
                    "timestamp": [1704409200, 1704668400, 1704754800],
                    "indicators": { "quote": [{ "close": [45.10, 45.80, 46.20] }] }
                }],
                "error": null
            }
        })
        .to_string();
        mount_chart(&server, "BHP.AX", body).await;

        let price = provider(&server)
            .historical_price("BHP.AX", date("2024-01-08"))
            .await;

        assert_eq!(price, Some(45.80));
    }

    #[tokio::test]
    async fn test_empty_chart_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#,
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_chart(&server, "AAPL", chart_body(Some(195.0), &[], &[])).await;
        let provider = provider(&server);

        assert_eq!(provider.current_price("AAPL").await, None);
        assert_eq!(provider.current_price("AAPL").await, Some(195.0));
    }

    #[tokio::test]
    async fn test_cached_response_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(chart_body(Some(195.0), &[], &[])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(provider.current_price("AAPL").await, Some(195.0));
        assert_eq!(provider.current_price("AAPL").await, Some(195.0));
    }

    #[tokio::test]
    async fn test_failures_collapse_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/DOWN"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_chart(&server, "EMPTY", r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#.to_string()).await;

        let provider = provider(&server);
        assert_eq!(provider.current_price("DOWN").await, None);
        assert_eq!(provider.current_price("EMPTY").await, None);
        assert_eq!(
            provider.historical_price("EMPTY", date("2024-01-02")).await,
            None
        );
        assert!(provider.search_tickers("DOWN").await.is_empty());
    }

    #[test]
    fn test_close_selection_window() {
        let start = 1_000_000;
        let bars = [(start - 10, 1.0), (start + WEEK_SECS + 5, 3.0)];
        // the bar past the window is never chosen over an earlier close
        assert_eq!(close_on_or_after(&bars, start), Some(1.0));
        assert_eq!(close_on_or_after(&[], start), None);
    }
}
