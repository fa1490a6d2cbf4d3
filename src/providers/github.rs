//! GitHub Contents API storage for the watchlist document.
//!
//! Saves are guarded by the blob SHA of the last load: if the file changed
//! remotely in the meantime the save is refused instead of overwriting it.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::config::GitHubConfig;
use crate::core::persist::{DocumentStore, PersistError, RemoteDocument};
use crate::core::session::Session;

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const CLIENT_AGENT: &str = concat!("stockwatch/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize, Debug)]
struct ContentsResponse {
    sha: String,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Serialize, Debug)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct PutResponse {
    content: Option<PutContent>,
}

#[derive(Deserialize, Debug)]
struct PutContent {
    sha: String,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: Option<String>,
}

fn storage_error(e: anyhow::Error) -> PersistError {
    PersistError::Storage(format!("{e:#}"))
}

/// Base64 from the Contents API is wrapped at 60 columns.
fn decode_content(encoded: &str) -> Result<String, PersistError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| PersistError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PersistError::Decode(e.to_string()))
}

async fn status_error(response: reqwest::Response) -> PersistError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    if (status.as_u16() == 403 || status.as_u16() == 429)
        && message.to_lowercase().contains("rate limit")
    {
        return PersistError::RateLimited;
    }
    PersistError::Status {
        status: status.as_u16(),
        message,
    }
}

/// 409 when the sha is stale, 422 when a file created meanwhile got no sha.
fn is_sha_rejection(err: &PersistError) -> bool {
    match err {
        PersistError::Status { status: 409, .. } => true,
        PersistError::Status {
            status: 422,
            message,
        } => message.to_lowercase().contains("sha"),
        _ => false,
    }
}

pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    path: String,
    branch: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    session: Session,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, session: Session) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(GitHubClient {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            path: config.path.trim_matches('/').to_string(),
            branch: config.branch.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            session,
        })
    }

    /// Remembers the credential and repository on this device. Switching
    /// repository forgets the previously seen version.
    pub fn authenticate(&self, token: &str, owner: &str, repo: &str) -> Result<(), PersistError> {
        self.session
            .set_credentials(token.trim(), owner.trim(), repo.trim())
            .and_then(|_| self.session.set_version(None))
            .map_err(storage_error)
    }

    pub fn logout(&self) -> Result<(), PersistError> {
        self.session.clear().map_err(storage_error)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.token().is_some()
    }

    /// Owner and repository, preferring the ones saved at login.
    pub fn coordinates(&self) -> Result<(String, String), PersistError> {
        let owner = self.session.owner().or_else(|| self.owner.clone());
        let repo = self.session.repo().or_else(|| self.repo.clone());
        match (owner, repo) {
            (Some(owner), Some(repo)) => Ok((owner, repo)),
            _ => Err(PersistError::NotConfigured),
        }
    }

    fn contents_url(&self, owner: &str, repo: &str) -> String {
        let path = self
            .path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            path
        );
        if let Some(branch) = &self.branch {
            url.push_str(&format!("?ref={}", urlencoding::encode(branch)));
        }
        url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, CLIENT_AGENT)
            .header(CACHE_CONTROL, "no-cache");
        match self.session.token() {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// The file moved between the version check and the write. Reports
    /// the version that won, or the API message when it cannot be fetched.
    async fn raced_conflict(&self, known: Option<String>, err: &PersistError) -> PersistError {
        warn!("Save rejected by GitHub: {}", err);
        let remote = match self.fetch_remote().await {
            Ok(document) => document.version.unwrap_or_default(),
            Err(e) => {
                debug!("Could not fetch the winning version: {}", e);
                err.to_string()
            }
        };
        PersistError::Conflict { known, remote }
    }

    async fn fetch_remote(&self) -> Result<RemoteDocument, PersistError> {
        let (owner, repo) = self.coordinates()?;
        let url = self.contents_url(&owner, &repo);
        debug!("Fetching {}", url);

        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("No document at {}", url);
            return Ok(RemoteDocument::default());
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let text = response.text().await?;
        let body: ContentsResponse =
            serde_json::from_str(&text).map_err(|e| PersistError::Decode(e.to_string()))?;

        let content = match body.encoding.as_deref() {
            None | Some("base64") => decode_content(body.content.as_deref().unwrap_or(""))?,
            Some(other) => {
                return Err(PersistError::Decode(format!(
                    "unsupported content encoding '{other}'"
                )));
            }
        };

        Ok(RemoteDocument {
            exists: true,
            content: Some(content),
            version: Some(body.sha),
        })
    }
}

#[async_trait]
impl DocumentStore for GitHubClient {
    #[instrument(name = "GitHubLoad", skip(self))]
    async fn load(&self) -> Result<RemoteDocument, PersistError> {
        let document = self.fetch_remote().await?;
        self.session
            .set_version(document.version.as_deref())
            .map_err(storage_error)?;
        Ok(document)
    }

    #[instrument(name = "GitHubSave", skip(self, content))]
    async fn save(&self, content: &str, message: &str) -> Result<String, PersistError> {
        if !self.is_authenticated() {
            return Err(PersistError::NotAuthenticated);
        }
        let (owner, repo) = self.coordinates()?;

        let remote = self.fetch_remote().await?;
        let known = self.session.version();
        if remote.exists {
            let remote_sha = remote.version.clone().unwrap_or_default();
            if known.as_deref() != Some(remote_sha.as_str()) {
                warn!(
                    "Refusing to save: remote is at {} but last load saw {:?}",
                    remote_sha, known
                );
                return Err(PersistError::Conflict {
                    known,
                    remote: remote_sha,
                });
            }
        }

        let request = PutRequest {
            message,
            content: STANDARD.encode(content),
            sha: remote.version.as_deref(),
            branch: self.branch.as_deref(),
        };
        let url = self.contents_url(&owner, &repo);
        let response = self.request(Method::PUT, &url).json(&request).send().await?;
        if !response.status().is_success() {
            let err = status_error(response).await;
            if is_sha_rejection(&err) {
                return Err(self.raced_conflict(known, &err).await);
            }
            return Err(err);
        }

        let text = response.text().await?;
        let body: PutResponse =
            serde_json::from_str(&text).map_err(|e| PersistError::Decode(e.to_string()))?;
        let sha = body
            .content
            .map(|c| c.sha)
            .ok_or_else(|| PersistError::Decode("save response has no content sha".to_string()))?;

        self.session.set_version(Some(&sha)).map_err(storage_error)?;
        info!("Saved {}/{}:{} at {}", owner, repo, self.path, sha);
        Ok(sha)
    }
}
