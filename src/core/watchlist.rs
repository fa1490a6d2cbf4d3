//! Watchlist data model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

pub const MAX_RATING: u8 = 5;

/// Stable identity of a watchlist row for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value computed from market data after load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Derived<T> {
    Loading,
    Value(T),
    NotAvailable,
    Error,
}

impl<T> Default for Derived<T> {
    fn default() -> Self {
        Derived::NotAvailable
    }
}

impl<T: Copy> Derived<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Derived::Value(v) => Some(*v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Derived<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Derived::NotAvailable, Derived::Value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub last_price: Derived<f64>,
    pub return_since_watch: Derived<Decimal>,
    pub return_3m: Derived<Decimal>,
}

impl QuoteSnapshot {
    pub fn loading() -> Self {
        Self {
            last_price: Derived::Loading,
            return_since_watch: Derived::Loading,
            return_3m: Derived::Loading,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    pub ticker: String,
    pub display_name: String,
    pub watch_since: NaiveDate,
    pub notes: String,
    pub quote: QuoteSnapshot,
    labels: BTreeSet<String>,
    rating: u8,
}

impl TrackedItem {
    pub fn new(ticker: &str, display_name: &str, watch_since: NaiveDate) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            display_name: display_name.trim().to_string(),
            watch_since,
            notes: String::new(),
            quote: QuoteSnapshot::default(),
            labels: BTreeSet::new(),
            rating: 0,
        }
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    /// Sets the rating, clamped to `0..=MAX_RATING`.
    pub fn set_rating(&mut self, rating: u8) {
        self.rating = rating.min(MAX_RATING);
    }

    /// Star-click semantics: choosing the current rating again clears it.
    pub fn toggle_rating(&mut self, rating: u8) -> u8 {
        let rating = rating.min(MAX_RATING);
        self.rating = if rating == self.rating { 0 } else { rating };
        self.rating
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label.trim())
    }

    /// Adds a label; returns false for blank labels, labels containing the
    /// document separator `,`, and labels already present.
    pub fn add_label(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || label.contains(',') {
            return false;
        }
        self.labels.insert(label.to_string())
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels.remove(label.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Rating,
    ReturnSinceWatch,
    ThreeMonthReturn,
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub sort: SortKey,
    /// Keep only items carrying at least one of these labels; empty keeps all.
    pub labels: Vec<String>,
}

/// Rows split the way the table shows them: rated first, unrated collapsed.
pub struct WatchlistView<'a> {
    pub rated: Vec<(ItemId, &'a TrackedItem)>,
    pub unrated: Vec<(ItemId, &'a TrackedItem)>,
}

/// The in-memory list, keyed by [`ItemId`] and kept in insertion order.
#[derive(Debug, Default)]
pub struct Watchlist {
    items: BTreeMap<ItemId, TrackedItem>,
    next_id: u64,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = TrackedItem>) -> Self {
        let mut list = Self::new();
        list.replace_all(items);
        list
    }

    pub fn insert(&mut self, item: TrackedItem) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(id, item);
        id
    }

    pub fn remove(&mut self, id: ItemId) -> Option<TrackedItem> {
        self.items.remove(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&TrackedItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut TrackedItem> {
        self.items.get_mut(&id)
    }

    /// First item with this ticker, ignoring case.
    pub fn find_by_ticker(&self, ticker: &str) -> Option<ItemId> {
        let ticker = ticker.trim();
        self.items
            .iter()
            .find(|(_, item)| item.ticker.eq_ignore_ascii_case(ticker))
            .map(|(id, _)| *id)
    }

    pub fn count_ticker(&self, ticker: &str) -> usize {
        let ticker = ticker.trim();
        self.items
            .values()
            .filter(|item| item.ticker.eq_ignore_ascii_case(ticker))
            .count()
    }

    /// Drops every item and takes `items` in their place. Ids are never
    /// reused, so ids handed out before the replacement no longer resolve.
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = TrackedItem>) {
        self.items.clear();
        for item in items {
            self.insert(item);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &TrackedItem)> {
        self.items.iter().map(|(id, item)| (*id, item))
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn all_labels(&self) -> BTreeSet<&str> {
        self.items.values().flat_map(|item| item.labels()).collect()
    }

    pub fn view(&self, options: &ViewOptions) -> WatchlistView<'_> {
        let mut rows: Vec<(ItemId, &TrackedItem)> = self
            .iter()
            .filter(|(_, item)| {
                options.labels.is_empty() || options.labels.iter().any(|l| item.has_label(l))
            })
            .collect();

        rows.sort_by(|(_, a), (_, b)| match options.sort {
            SortKey::Rating => b.rating.cmp(&a.rating),
            SortKey::ReturnSinceWatch => descending(
                a.quote.return_since_watch.value(),
                b.quote.return_since_watch.value(),
            ),
            SortKey::ThreeMonthReturn => {
                descending(a.quote.return_3m.value(), b.quote.return_3m.value())
            }
        });

        let (rated, unrated): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|(_, item)| item.rating > 0);
        WatchlistView { rated, unrated }
    }
}

/// Larger values first, unavailable values last.
fn descending(a: Option<Decimal>, b: Option<Decimal>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
