//! Commands that change the watchlist: load, mutate, refresh, render, save.

use super::{load_watchlist, refresh_with_progress, ui};
use crate::core::document;
use crate::core::persist::DocumentStore;
use crate::core::quote::{QuoteProvider, validate_ticker};
use crate::core::refresh::RefreshSettings;
use crate::core::watchlist::{ItemId, TrackedItem, Watchlist};
use anyhow::{Result, anyhow, bail};
use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct Editor<'a> {
    store: &'a dyn DocumentStore,
    quotes: &'a dyn QuoteProvider,
    settings: &'a RefreshSettings,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn check_not_future(date: NaiveDate) -> Result<()> {
    if date > today() {
        bail!("Watch date {} is in the future", date);
    }
    Ok(())
}

/// First item with `ticker`; duplicates are reported, not merged.
fn select(list: &Watchlist, ticker: &str) -> Result<ItemId> {
    let id = list
        .find_by_ticker(ticker)
        .ok_or_else(|| anyhow!("{} is not on the watchlist", ticker.trim().to_uppercase()))?;
    let count = list.count_ticker(ticker);
    if count > 1 {
        println!(
            "{}",
            ui::style_text(
                &format!("{count} entries for {ticker}; changing the first one"),
                ui::StyleType::Warning
            )
        );
    }
    Ok(id)
}

fn item_mut(list: &mut Watchlist, id: ItemId) -> Result<&mut TrackedItem> {
    list.get_mut(id)
        .ok_or_else(|| anyhow!("Item {} disappeared from the watchlist", id))
}

impl<'a> Editor<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        quotes: &'a dyn QuoteProvider,
        settings: &'a RefreshSettings,
    ) -> Self {
        Self {
            store,
            quotes,
            settings,
        }
    }

    /// Runs one edit. `mutate` returns the commit message, or `None` when
    /// nothing changed and no save is needed.
    async fn apply<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Watchlist) -> Result<Option<String>>,
    {
        let (mut list, remote) = load_watchlist(self.store).await?;
        debug!("Loaded {} items (version {:?})", list.len(), remote.version);

        let Some(message) = mutate(&mut list)? else {
            println!("{}", ui::style_text("Nothing to change", ui::StyleType::Subtle));
            return Ok(());
        };

        // the stored table carries market columns, so every row is refreshed
        let list = Mutex::new(list);
        refresh_with_progress(&list, self.quotes, self.settings).await;
        let list = list.into_inner();

        let content = document::render(&list);
        let version = self.store.save(&content, &message).await?;
        println!(
            "{} {} ({})",
            ui::style_text("Saved:", ui::StyleType::Success),
            message,
            ui::style_text(&version.chars().take(7).collect::<String>(), ui::StyleType::Subtle)
        );
        Ok(())
    }

    pub async fn add(
        &self,
        ticker: &str,
        since: Option<NaiveDate>,
        labels: &[String],
        note: Option<&str>,
    ) -> Result<()> {
        let since = since.unwrap_or_else(today);
        check_not_future(since)?;

        let found = validate_ticker(self.quotes, ticker).await.ok_or_else(|| {
            anyhow!(
                "Unknown ticker '{}'; use `stockwatch search` to find one",
                ticker.trim()
            )
        })?;

        self.apply(|list| {
            if list.count_ticker(&found.symbol) > 0 {
                warn!("{} is already on the watchlist", found.symbol);
                println!(
                    "{}",
                    ui::style_text(
                        &format!("{} is already on the watchlist; adding another entry", found.symbol),
                        ui::StyleType::Warning
                    )
                );
            }
            let mut item = TrackedItem::new(&found.symbol, &found.name, since);
            for label in labels {
                item.add_label(label);
            }
            if let Some(note) = note {
                item.notes = note.trim().to_string();
            }
            list.insert(item);
            Ok(Some(format!("Add {} to watchlist", found.symbol)))
        })
        .await
    }

    pub async fn remove(&self, ticker: &str) -> Result<()> {
        self.apply(|list| {
            let id = select(list, ticker)?;
            let removed = list
                .remove(id)
                .ok_or_else(|| anyhow!("Item {} disappeared from the watchlist", id))?;
            Ok(Some(format!("Remove {} from watchlist", removed.ticker)))
        })
        .await
    }

    /// Picking the current rating again clears it.
    pub async fn rate(&self, ticker: &str, rating: u8) -> Result<()> {
        self.apply(|list| {
            let id = select(list, ticker)?;
            let item = item_mut(list, id)?;
            let rating = item.toggle_rating(rating);
            println!("{} {}", item.ticker, ui::stars(rating));
            Ok(Some(format!("Rate {} {}/5", item.ticker, rating)))
        })
        .await
    }

    pub async fn label(&self, ticker: &str, add: &[String], remove: &[String]) -> Result<()> {
        self.apply(|list| {
            let id = select(list, ticker)?;
            let item = item_mut(list, id)?;
            let mut changed = false;
            for label in add {
                changed |= item.add_label(label);
            }
            for label in remove {
                changed |= item.remove_label(label);
            }
            Ok(changed.then(|| format!("Update labels of {}", item.ticker)))
        })
        .await
    }

    pub async fn note(&self, ticker: &str, text: &str) -> Result<()> {
        self.apply(|list| {
            let id = select(list, ticker)?;
            let item = item_mut(list, id)?;
            let text = text.trim();
            if item.notes == text {
                return Ok(None);
            }
            item.notes = text.to_string();
            Ok(Some(format!("Update notes of {}", item.ticker)))
        })
        .await
    }

    pub async fn since(&self, ticker: &str, date: NaiveDate) -> Result<()> {
        check_not_future(date)?;
        self.apply(|list| {
            let id = select(list, ticker)?;
            let item = item_mut(list, id)?;
            if item.watch_since == date {
                return Ok(None);
            }
            item.watch_since = date;
            Ok(Some(format!("Watch {} since {}", item.ticker, date)))
        })
        .await
    }
}
