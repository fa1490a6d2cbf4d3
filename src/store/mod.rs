pub mod disk;
pub mod memory;

use crate::core::cache::KeyValueCollection;
use disk::DiskCollection;
use memory::MemoryCollection;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const SESSION_PARTITION: &str = "session";

/// Opens the on-device session store under `data_dir`, falling back to a
/// volatile in-memory store when the disk store cannot be opened.
pub fn open_session_store(data_dir: &Path) -> Arc<dyn KeyValueCollection> {
    match DiskCollection::open(&data_dir.join(SESSION_PARTITION), SESSION_PARTITION) {
        Ok(collection) => Arc::new(collection),
        Err(e) => {
            warn!(
                "Session store unavailable ({:#}); credentials will not be remembered",
                e
            );
            Arc::new(MemoryCollection::new())
        }
    }
}
