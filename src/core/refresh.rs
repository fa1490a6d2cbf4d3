//! Batched quote refresh for watchlist items

use crate::core::quote::QuoteProvider;
use crate::core::returns::percent_change;
use crate::core::watchlist::{Derived, ItemId, QuoteSnapshot, Watchlist};
use chrono::NaiveDate;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Items fetched concurrently per group.
    pub batch_size: usize,
    /// Pause between groups so a rate-limited provider is not flooded.
    pub pause: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pause: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub updated: usize,
    /// Items removed while their quotes were in flight.
    pub dropped: usize,
}

/// Fetches every market-derived value for one ticker.
pub async fn fetch_snapshot(
    provider: &dyn QuoteProvider,
    ticker: &str,
    since: NaiveDate,
) -> QuoteSnapshot {
    let (current, start, three_month) = tokio::join!(
        provider.current_price(ticker),
        provider.historical_price(ticker, since),
        provider.three_month_return(ticker),
    );

    let return_since_watch = match (start, current) {
        (Some(start), Some(current)) => {
            percent_change(start, current).map_or(Derived::Error, Derived::Value)
        }
        _ => Derived::NotAvailable,
    };

    QuoteSnapshot {
        last_price: current.into(),
        return_since_watch,
        return_3m: three_month.into(),
    }
}

/// Refreshes the quotes of `targets` in groups of `batch_size`.
///
/// The lock is only held to snapshot the work and to write results back, so
/// the list stays editable while requests are in flight. Results are written
/// by [`ItemId`]; an item removed in the meantime is skipped.
#[instrument(name = "RefreshQuotes", skip_all, fields(items = targets.len()))]
pub async fn refresh(
    list: &Mutex<Watchlist>,
    targets: &[ItemId],
    provider: &dyn QuoteProvider,
    settings: &RefreshSettings,
    on_item: &(dyn Fn() + Send + Sync),
) -> RefreshSummary {
    let jobs: Vec<(ItemId, String, NaiveDate)> = {
        let mut guard = list.lock().await;
        targets
            .iter()
            .filter_map(|id| {
                let item = guard.get_mut(*id)?;
                item.quote = QuoteSnapshot::loading();
                Some((*id, item.ticker.clone(), item.watch_since))
            })
            .collect()
    };

    let mut summary = RefreshSummary::default();
    for (index, batch) in jobs.chunks(settings.batch_size.max(1)).enumerate() {
        if index > 0 && !settings.pause.is_zero() {
            tokio::time::sleep(settings.pause).await;
        }
        debug!("Refreshing batch {} ({} items)", index + 1, batch.len());

        let results = join_all(batch.iter().map(|(id, ticker, since)| async move {
            (*id, fetch_snapshot(provider, ticker, *since).await)
        }))
        .await;

        let mut guard = list.lock().await;
        for (id, snapshot) in results {
            match guard.get_mut(id) {
                Some(item) => {
                    item.quote = snapshot;
                    summary.updated += 1;
                }
                None => {
                    debug!("Item {} was removed during refresh; dropping its quote", id);
                    summary.dropped += 1;
                }
            }
            on_item();
        }
    }

    summary
}
