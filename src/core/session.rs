//! Remembered connection state for the remote document

use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use std::sync::Arc;

const TOKEN_KEY: &str = "github_token";
const OWNER_KEY: &str = "github_owner";
const REPO_KEY: &str = "github_repo";
const VERSION_KEY: &str = "document_sha";

/// Typed view over the device session store.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueCollection>,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueCollection>) -> Self {
        Self { store }
    }

    pub fn token(&self) -> Option<String> {
        self.non_empty(TOKEN_KEY)
    }

    pub fn owner(&self) -> Option<String> {
        self.non_empty(OWNER_KEY)
    }

    pub fn repo(&self) -> Option<String> {
        self.non_empty(REPO_KEY)
    }

    /// Last document version seen by a load or produced by a save.
    pub fn version(&self) -> Option<String> {
        self.non_empty(VERSION_KEY)
    }

    pub fn set_credentials(&self, token: &str, owner: &str, repo: &str) -> Result<()> {
        self.store.put(TOKEN_KEY, token)?;
        self.store.put(OWNER_KEY, owner)?;
        self.store.put(REPO_KEY, repo)
    }

    pub fn set_version(&self, version: Option<&str>) -> Result<()> {
        match version {
            Some(sha) => self.store.put(VERSION_KEY, sha),
            None => self.store.remove(VERSION_KEY),
        }
    }

    pub fn clear(&self) -> Result<()> {
        for key in [TOKEN_KEY, OWNER_KEY, REPO_KEY, VERSION_KEY] {
            self.store.remove(key)?;
        }
        Ok(())
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.store.get(key).filter(|value| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;

    #[test]
    fn test_credentials_and_version_round_trip() {
        let session = Session::new(Arc::new(MemoryCollection::new()));
        assert!(session.token().is_none());

        session.set_credentials("tok", "octocat", "stocks").unwrap();
        session.set_version(Some("abc123")).unwrap();

        assert_eq!(session.token().as_deref(), Some("tok"));
        assert_eq!(session.owner().as_deref(), Some("octocat"));
        assert_eq!(session.repo().as_deref(), Some("stocks"));
        assert_eq!(session.version().as_deref(), Some("abc123"));

        session.set_version(None).unwrap();
        assert!(session.version().is_none());
    }

    #[test]
    fn test_clear_forgets_everything() {
        let session = Session::new(Arc::new(MemoryCollection::new()));
        session.set_credentials("tok", "octocat", "stocks").unwrap();
        session.set_version(Some("abc123")).unwrap();

        session.clear().unwrap();

        assert!(session.token().is_none());
        assert!(session.owner().is_none());
        assert!(session.repo().is_none());
        assert!(session.version().is_none());
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let store = Arc::new(MemoryCollection::new());
        store.put(TOKEN_KEY, "  ").unwrap();
        let session = Session::new(store);
        assert!(session.token().is_none());
    }
}
