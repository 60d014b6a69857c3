#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qiita2crowi::crowi::{Gateway, RemotePage};
use qiita2crowi::error::{FetchError, GatewayError};
use qiita2crowi::fetch::AssetSource;
use qiita2crowi::model::{Article, Author, Comment};
use reqwest::StatusCode;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { path: String, body: String },
    Update { page_id: String, body: String },
    Attach { page_id: String, file: PathBuf },
}

impl Call {
    pub fn page_id(&self) -> &str {
        match self {
            Call::Create { path, .. } => path,
            Call::Update { page_id, .. } | Call::Attach { page_id, .. } => page_id,
        }
    }
}

/// In-memory wiki. Page ids are the page path, attachment references are
/// `/files/<file name>` unless scripted otherwise.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    calls: Arc<Mutex<Vec<Call>>>,
    reject_create: Arc<HashSet<String>>,
    reject_update: Arc<Mutex<VecDeque<bool>>>,
    attachments: Arc<Mutex<VecDeque<Result<String, GatewayError>>>>,
    latency: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_create(mut self, paths: &[&str]) -> Self {
        self.reject_create = Arc::new(paths.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Outcome of successive `update_page` calls: `true` rejects the call.
    /// Calls past the end of the script succeed.
    pub fn with_update_script(mut self, script: Vec<bool>) -> Self {
        self.reject_update = Arc::new(Mutex::new(VecDeque::from(script)));
        self
    }

    pub fn with_attachment_responses(mut self, responses: Vec<Result<String, GatewayError>>) -> Self {
        self.attachments = Arc::new(Mutex::new(VecDeque::from(responses)));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, page_id: &str) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.page_id() == page_id)
            .collect()
    }

    /// Highest number of `create_page` calls that overlapped.
    pub fn peak_creates(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn record(&self, call: Call) {
        self.calls.lock().await.push(call);
    }
}

fn rejected(operation: &'static str) -> GatewayError {
    GatewayError::Rejected {
        operation,
        message: "scripted rejection".into(),
    }
}

#[async_trait::async_trait]
impl Gateway for RecordingGateway {
    async fn create_page(&self, path: &str, body: &str) -> Result<RemotePage, GatewayError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.record(Call::Create {
            path: path.to_string(),
            body: body.to_string(),
        })
        .await;
        if self.reject_create.contains(path) {
            return Err(rejected("pages.create"));
        }
        Ok(RemotePage {
            id: path.to_string(),
            path: path.to_string(),
        })
    }

    async fn update_page(&self, page_id: &str, body: &str) -> Result<(), GatewayError> {
        self.record(Call::Update {
            page_id: page_id.to_string(),
            body: body.to_string(),
        })
        .await;
        let reject = self.reject_update.lock().await.pop_front().unwrap_or(false);
        if reject {
            return Err(rejected("pages.update"));
        }
        Ok(())
    }

    async fn add_attachment(&self, page_id: &str, file: &Path) -> Result<String, GatewayError> {
        self.record(Call::Attach {
            page_id: page_id.to_string(),
            file: file.to_path_buf(),
        })
        .await;
        if let Some(scripted) = self.attachments.lock().await.pop_front() {
            return scripted;
        }
        let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        Ok(format!("/files/{}", name))
    }
}

/// Asset source that never touches the network: the artifact path is
/// `dest_dir/<final URL segment>` and nothing is written.
#[derive(Clone, Default)]
pub struct FakeAssets {
    fetched: Arc<Mutex<Vec<(String, PathBuf)>>>,
    missing: Arc<HashSet<String>>,
}

impl FakeAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn missing(urls: &[&str]) -> Self {
        Self {
            missing: Arc::new(urls.iter().map(|u| u.to_string()).collect()),
            ..Self::default()
        }
    }

    pub async fn fetched(&self) -> Vec<(String, PathBuf)> {
        self.fetched.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl AssetSource for FakeAssets {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        self.fetched
            .lock()
            .await
            .push((url.to_string(), dest_dir.to_path_buf()));
        if self.missing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: StatusCode::NOT_FOUND,
            });
        }
        let name = url.rsplit('/').next().unwrap_or_default();
        Ok(dest_dir.join(name))
    }
}

pub fn article(title: &str, body: &str, rendered_body: &str) -> Article {
    Article {
        id: String::new(),
        title: title.to_string(),
        body: body.to_string(),
        rendered_body: rendered_body.to_string(),
        url: format!("https://team.qiita.com/alice/items/{}", title.len()),
        created_at: None,
        updated_at: None,
        private: false,
        coediting: false,
        tags: Vec::new(),
        user: None,
        comments: Vec::new(),
    }
}

pub fn comment(user: &str, body: &str) -> Comment {
    Comment {
        user: Author {
            id: user.to_string(),
            permanent_id: None,
            profile_image_url: None,
        },
        body: body.to_string(),
    }
}
