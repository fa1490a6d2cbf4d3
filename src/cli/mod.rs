pub mod auth;
pub mod edit;
pub mod search;
pub mod setup;
pub mod show;
pub mod ui;

use crate::core::document;
use crate::core::persist::{DocumentStore, RemoteDocument};
use crate::core::quote::QuoteProvider;
use crate::core::refresh::{self, RefreshSettings, RefreshSummary};
use crate::core::watchlist::Watchlist;
use anyhow::{Context, Result};
use tokio::sync::Mutex;

/// Loads and parses the remote document. A document that does not parse is
/// reported and never written back.
pub(crate) async fn load_watchlist(store: &dyn DocumentStore) -> Result<(Watchlist, RemoteDocument)> {
    let remote = store.load().await?;
    let items = document::parse(remote.content_or_empty())
        .context("Remote watchlist could not be parsed; it was left untouched")?;
    Ok((Watchlist::from_items(items), remote))
}

/// Refreshes every item while showing a progress bar.
pub(crate) async fn refresh_with_progress(
    list: &Mutex<Watchlist>,
    quotes: &dyn QuoteProvider,
    settings: &RefreshSettings,
) -> RefreshSummary {
    let ids = list.lock().await.ids();
    if ids.is_empty() {
        return RefreshSummary::default();
    }

    let pb = ui::new_progress_bar(ids.len() as u64, true);
    pb.set_message("Fetching quotes");
    let summary = refresh::refresh(list, &ids, quotes, settings, &|| pb.inc(1)).await;
    pb.finish_and_clear();
    summary
}
