pub mod github;
pub mod relay;
pub mod yahoo_finance;

// Re-export traits for providers to easily use cache
pub use crate::core::cache::Cache;
pub use crate::store::memory::MemoryCache;
