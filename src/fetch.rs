//! Downloading embedded images into local artifacts.
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{Config, Retry};
use crate::error::FetchError;
use crate::retry::with_retry;

/// Source of image artifacts for the migrator.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Download `url` into `dest_dir` and return the artifact path.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    token: Option<String>,
    trusted_hosts: Vec<String>,
    retry: Retry,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("authenticated", &self.token.is_some())
            .field("trusted_hosts", &self.trusted_hosts)
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new(http: Client, token: Option<String>, trusted_hosts: Vec<String>, retry: Retry) -> Self {
        Self {
            http,
            token: token.filter(|t| !t.trim().is_empty()),
            trusted_hosts,
            retry,
        }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Self {
        Self::new(
            http,
            cfg.qiita.token.clone(),
            cfg.qiita.trusted_hosts.clone(),
            cfg.retry.clone(),
        )
    }

    /// Whether a request to `url` carries the bearer token: only when a
    /// token is configured and the host is not trusted storage.
    pub fn sends_credential(&self, url: &Url) -> bool {
        if self.token.is_none() {
            return false;
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        !self.trusted_hosts.iter().any(|trusted| {
            let trusted = trusted.trim().to_ascii_lowercase();
            host == trusted || host.ends_with(&format!(".{}", trusted))
        })
    }

    pub fn build_request(&self, url: &Url) -> reqwest::Result<reqwest::Request> {
        let mut builder = self.http.get(url.clone());
        if let Some(token) = self.token.as_deref().filter(|_| self.sends_credential(url)) {
            builder = builder.bearer_auth(token);
        }
        builder.build()
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let request = self.build_request(url).map_err(transport)?;
        let res = self.http.execute(request).await.map_err(transport)?;
        if !res.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: res.status(),
            });
        }
        let bytes = res.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetSource for HttpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let invalid = || FetchError::InvalidUrl {
            url: url.to_string(),
        };
        let parsed = Url::parse(url).map_err(|_| invalid())?;
        let name = artifact_name(&parsed).ok_or_else(invalid)?;

        let target = &parsed;
        let bytes = with_retry(&self.retry, url, || self.download(target)).await?;

        let dest = dest_dir.join(name);
        let io = |source| FetchError::Io {
            path: dest.clone(),
            source,
        };
        tokio::fs::create_dir_all(dest_dir).await.map_err(io)?;
        // Same final segment within one article: last writer wins.
        tokio::fs::write(&dest, &bytes).await.map_err(io)?;
        debug!(url, path = %dest.display(), size = bytes.len(), "asset downloaded");
        Ok(dest)
    }
}

/// Final path segment of `url`, used as the artifact file name.
pub fn artifact_name(url: &Url) -> Option<&str> {
    let last = url.path_segments()?.next_back()?;
    match last {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
