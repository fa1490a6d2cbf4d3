//! Core business logic abstractions

pub mod autosave;
pub mod cache;
pub mod config;
pub mod document;
pub mod log;
pub mod persist;
pub mod quote;
pub mod refresh;
pub mod returns;
pub mod session;
pub mod watchlist;

// Re-export main types for cleaner imports
pub use persist::{DocumentStore, PersistError, RemoteDocument};
pub use quote::{QuoteKey, QuoteProvider, TickerMatch};
pub use watchlist::{Derived, ItemId, TrackedItem, Watchlist};
