use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, Retry};
use crate::error::GatewayError;
use crate::retry::{with_retry_if, IsRetryable};

const PAGES_CREATE: &str = "pages.create";
const PAGES_UPDATE: &str = "pages.update";
const ATTACHMENTS_ADD: &str = "attachments.add";

/// Page as echoed back by `pages.create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub id: String,
    pub path: String,
}

/// The three wiki operations the migrator depends on.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn create_page(&self, path: &str, body: &str) -> Result<RemotePage, GatewayError>;

    /// Replace the whole body of `page_id`.
    async fn update_page(&self, page_id: &str, body: &str) -> Result<(), GatewayError>;

    /// Upload `file` to `page_id`. Returns the reference to substitute
    /// for the original image URL in the page body.
    async fn add_attachment(&self, page_id: &str, file: &Path) -> Result<String, GatewayError>;
}

/// Shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent("qiita2crowi/0.1")
        .timeout(timeout)
        .build()
}

#[derive(Clone)]
pub struct CrowiClient {
    http: Client,
    base_url: Url,
    endpoints: Endpoints,
    access_token: String,
    retry: Retry,
}

#[derive(Debug, Clone)]
struct Endpoints {
    pages_create: Url,
    pages_update: Url,
    attachments_add: Url,
}

impl fmt::Debug for CrowiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrowiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CrowiClient {
    /// `base_url` may carry a sub-path (`https://host/wiki`); API endpoints
    /// resolve beneath it.
    pub fn new(http: Client, base_url: &str, access_token: String, retry: Retry) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid Crowi URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let join = |operation: &str| {
            base_url
                .join(&format!("_api/{}", operation))
                .with_context(|| format!("cannot build {} endpoint", operation))
        };
        let endpoints = Endpoints {
            pages_create: join(PAGES_CREATE)?,
            pages_update: join(PAGES_UPDATE)?,
            attachments_add: join(ATTACHMENTS_ADD)?,
        };
        Ok(Self {
            http,
            base_url,
            endpoints,
            access_token,
            retry,
        })
    }

    pub fn from_config(http: Client, cfg: &Config) -> Result<Self> {
        Self::new(
            http,
            &cfg.crowi.url,
            cfg.crowi.access_token.clone(),
            cfg.retry.clone(),
        )
    }

    pub fn endpoint(&self, operation: &'static str) -> &Url {
        match operation {
            PAGES_CREATE => &self.endpoints.pages_create,
            PAGES_UPDATE => &self.endpoints.pages_update,
            _ => &self.endpoints.attachments_add,
        }
    }

    fn form(&self) -> Form {
        Form::new().text("access_token", self.access_token.clone())
    }

    async fn post<F>(&self, operation: &'static str, build_form: F) -> Result<ApiResponse, GatewayError>
    where
        F: Fn() -> Result<Form, GatewayError>,
    {
        let http = &self.http;
        let url = self.endpoint(operation);
        let build_form = &build_form;
        let retry_on = |err: &GatewayError| retryable(operation, err);
        with_retry_if(&self.retry, operation, retry_on, || async move {
            let form = build_form()?;
            debug!(operation, url = %url, "sending crowi request");
            let res = http
                .post(url.clone())
                .multipart(form)
                .send()
                .await
                .map_err(|source| GatewayError::Transport { operation, source })?;

            let status = res.status();
            let text = res
                .text()
                .await
                .map_err(|source| GatewayError::Transport { operation, source })?;
            if !status.is_success() {
                return Err(GatewayError::Status {
                    operation,
                    status,
                    body: text,
                });
            }
            parse_response(operation, &text)
        })
        .await
    }
}

#[async_trait]
impl Gateway for CrowiClient {
    async fn create_page(&self, path: &str, body: &str) -> Result<RemotePage, GatewayError> {
        let res = self
            .post(PAGES_CREATE, || {
                Ok(self
                    .form()
                    .text("path", path.to_string())
                    .text("body", body.to_string()))
            })
            .await?;
        let page = res.page.ok_or(GatewayError::MissingField {
            operation: PAGES_CREATE,
            field: "page",
        })?;
        let id = page.id.or(page.object_id).ok_or(GatewayError::MissingField {
            operation: PAGES_CREATE,
            field: "page.id",
        })?;
        Ok(RemotePage {
            id,
            path: page.path.unwrap_or_else(|| path.to_string()),
        })
    }

    async fn update_page(&self, page_id: &str, body: &str) -> Result<(), GatewayError> {
        self.post(PAGES_UPDATE, || {
            Ok(self
                .form()
                .text("page_id", page_id.to_string())
                .text("body", body.to_string()))
        })
        .await?;
        Ok(())
    }

    async fn add_attachment(&self, page_id: &str, file: &Path) -> Result<String, GatewayError> {
        let bytes = tokio::fs::read(file).await.map_err(|source| GatewayError::Io {
            operation: ATTACHMENTS_ADD,
            path: file.to_path_buf(),
            source,
        })?;
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();
        let mime = content_type(file);

        let res = self
            .post(ATTACHMENTS_ADD, || {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|source| GatewayError::Transport {
                        operation: ATTACHMENTS_ADD,
                        source,
                    })?;
                Ok(self.form().text("page_id", page_id.to_string()).part("file", part))
            })
            .await?;
        res.filename
            .filter(|f| !f.is_empty())
            .ok_or(GatewayError::MissingField {
                operation: ATTACHMENTS_ADD,
                field: "filename",
            })
    }
}

/// `pages.create` and `attachments.add` are not idempotent: once the server
/// may have seen the request, resending it can fail on the page it already
/// created or upload a second copy. Those only retry connect failures.
fn retryable(operation: &'static str, err: &GatewayError) -> bool {
    match operation {
        PAGES_CREATE | ATTACHMENTS_ADD => err.is_unsent(),
        _ => err.is_retryable(),
    }
}

/// Decode a Crowi API reply and turn `ok: false` into a rejection.
fn parse_response(operation: &'static str, text: &str) -> Result<ApiResponse, GatewayError> {
    let res: ApiResponse = serde_json::from_str(text)
        .map_err(|source| GatewayError::Decode { operation, source })?;
    if !res.ok {
        let message = match &res.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        };
        return Err(GatewayError::Rejected { operation, message });
    }
    Ok(res)
}

pub fn content_type(file_path: &Path) -> &'static str {
    match file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_ascii_lowercase())
    {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "gif" => "image/gif",
        Some(ext) if ext == "svg" => "image/svg+xml",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    page: Option<PageBody>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    object_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
}
