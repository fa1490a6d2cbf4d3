use crate::core::cache::KeyValueCollection;
use anyhow::{Context, Result};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

/// Session storage persisted in a fjall partition, so a later run can
/// reconnect without logging in again.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn open(path: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open session store at {}", path.display()))?;
        let partition = keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .with_context(|| format!("Failed to open session partition: {name}"))?;
        Ok(Self {
            keyspace,
            partition,
        })
    }

    fn flush(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to persist session store")
    }
}

impl KeyValueCollection for DiskCollection {
    fn get(&self, key: &str) -> Option<String> {
        match self.partition.get(key.as_bytes()) {
            Ok(Some(value)) => String::from_utf8(value.to_vec()).ok(),
            Ok(None) => None,
            Err(e) => {
                debug!("DiskCollection get error for {}: {}", key, e);
                None
            }
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.partition
            .insert(key.as_bytes(), value.as_bytes())
            .with_context(|| format!("Failed to store session key: {key}"))?;
        debug!("Session PUT for key: {}", key);
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.partition
            .remove(key.as_bytes())
            .with_context(|| format!("Failed to remove session key: {key}"))?;
        debug!("Session REMOVE for key: {}", key);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_disk_collection_put_get_remove() {
        let dir = tempdir().unwrap();
        let collection = DiskCollection::open(dir.path(), "session").unwrap();

        assert!(collection.get("github_owner").is_none());

        collection.put("github_owner", "octocat").unwrap();
        collection.put("github_repo", "stocks").unwrap();
        assert_eq!(collection.get("github_owner").as_deref(), Some("octocat"));

        collection.remove("github_repo").unwrap();
        assert!(collection.get("github_repo").is_none());
    }
}
