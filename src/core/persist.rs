//! Remote document storage with optimistic concurrency

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Not authenticated; run `stockwatch login` first")]
    NotAuthenticated,

    #[error("Repository owner and name are not configured")]
    NotConfigured,

    #[error(
        "Remote document changed since it was last loaded (known: {}, remote: {remote}); reload before saving",
        .known.as_deref().unwrap_or("none")
    )]
    Conflict {
        known: Option<String>,
        remote: String,
    },

    #[error("GitHub API rate limit exceeded; try again later")]
    RateLimited,

    #[error("GitHub API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode remote document: {0}")]
    Decode(String),

    #[error("Local session storage failed: {0}")]
    Storage(String),
}

/// A remote document as seen by the last load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDocument {
    pub exists: bool,
    pub content: Option<String>,
    /// Opaque version token (content hash) of the loaded revision.
    pub version: Option<String>,
}

impl RemoteDocument {
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches the document and remembers its version token.
    async fn load(&self) -> Result<RemoteDocument, PersistError>;

    /// Writes `content` only if the remote still matches the remembered
    /// version token. Returns the new token.
    async fn save(&self, content: &str, message: &str) -> Result<String, PersistError>;
}
