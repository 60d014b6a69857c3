//! Per-article migration: create the page, relocate its images, rewrite the
//! body, append the comment thread.
//!
//! Every `update_page` call replaces the whole page body, so the stages run
//! strictly in order and each one builds on the body produced by the
//! previous one. A failure in any stage stops the article; later stages
//! never run and the page keeps whatever was last written.
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::crowi::Gateway;
use crate::error::MigrationError;
use crate::fetch::AssetSource;
use crate::images::find_images;
use crate::model::{Article, Comment};
use crate::path::title_path;

pub const COMMENTS_HEADER: &str = "# Comments by Qiita:Team\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Create,
    RelocateImages,
    RewriteBody,
    AppendComments,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Create => "create",
            Stage::RelocateImages => "relocate_images",
            Stage::RewriteBody => "rewrite_body",
            Stage::AppendComments => "append_comments",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum MigrationOutcome {
    Succeeded {
        page_id: String,
        relocated_images: usize,
    },
    Failed {
        stage: Stage,
        reason: MigrationError,
    },
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MigrationOutcome::Succeeded { .. })
    }
}

/// An image URL and the wiki reference that replaced it in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedAsset {
    pub original: String,
    pub reference: String,
}

/// Page id plus the body as it currently stands, owned by one migration.
#[derive(Debug)]
struct WorkingPage {
    page_id: String,
    body: String,
}

enum State {
    Start,
    Created(WorkingPage),
    ImagesRelocated {
        page: WorkingPage,
        relocated: Vec<RelocatedAsset>,
    },
    BodyRewritten {
        page: WorkingPage,
        relocated: usize,
    },
    CommentsAppended {
        page: WorkingPage,
        relocated: usize,
    },
}

pub struct ArticleMigrator {
    gateway: Arc<dyn Gateway>,
    assets: Arc<dyn AssetSource>,
    page_path: String,
    work_dir: PathBuf,
}

impl fmt::Debug for ArticleMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArticleMigrator")
            .field("page_path", &self.page_path)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl ArticleMigrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        assets: Arc<dyn AssetSource>,
        page_path: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            assets,
            page_path: page_path.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Drive one article to a terminal outcome. `key` names the article's
    /// private artifact directory under the work dir.
    #[instrument(skip_all, fields(title = %article.title))]
    pub async fn migrate(&self, article: &Article, key: &str) -> MigrationOutcome {
        let mut state = State::Start;
        loop {
            let (stage, step) = match state {
                State::Start => (Stage::Create, self.create(article).await.map(State::Created)),
                State::Created(page) => (
                    Stage::RelocateImages,
                    self.relocate_images(article, key, page)
                        .await
                        .map(|(page, relocated)| State::ImagesRelocated { page, relocated }),
                ),
                State::ImagesRelocated { page, relocated } => (
                    Stage::RewriteBody,
                    self.rewrite_body(page, &relocated)
                        .await
                        .map(|page| State::BodyRewritten {
                            page,
                            relocated: relocated.len(),
                        }),
                ),
                State::BodyRewritten { page, relocated } => (
                    Stage::AppendComments,
                    self.append_comments(&article.comments, page)
                        .await
                        .map(|page| State::CommentsAppended { page, relocated }),
                ),
                State::CommentsAppended { page, relocated } => {
                    return MigrationOutcome::Succeeded {
                        page_id: page.page_id,
                        relocated_images: relocated,
                    }
                }
            };

            state = match step {
                Ok(next) => next,
                Err(reason) => return MigrationOutcome::Failed { stage, reason },
            };
        }
    }

    async fn create(&self, article: &Article) -> Result<WorkingPage, MigrationError> {
        let path = title_path(&self.page_path, &article.title)?;
        let body = initial_body(article);
        let page = self.gateway.create_page(&path, &body).await?;
        info!(path = %path, page_id = %page.id, "page created");
        Ok(WorkingPage {
            page_id: page.id,
            body,
        })
    }

    async fn relocate_images(
        &self,
        article: &Article,
        key: &str,
        mut page: WorkingPage,
    ) -> Result<(WorkingPage, Vec<RelocatedAsset>), MigrationError> {
        let dest_dir = self.work_dir.join(key);
        let mut relocated = Vec::new();
        for url in find_images(&article.rendered_body) {
            let artifact = self.assets.fetch(&url, &dest_dir).await?;
            let reference = self.gateway.add_attachment(&page.page_id, &artifact).await?;
            debug!(url = %url, reference = %reference, "image relocated");
            page.body = page.body.replace(url.as_ref(), &reference);
            relocated.push(RelocatedAsset {
                original: url.into_owned(),
                reference,
            });
        }
        Ok((page, relocated))
    }

    async fn rewrite_body(
        &self,
        page: WorkingPage,
        relocated: &[RelocatedAsset],
    ) -> Result<WorkingPage, MigrationError> {
        if relocated.is_empty() {
            return Ok(page);
        }
        self.gateway.update_page(&page.page_id, &page.body).await?;
        info!(page_id = %page.page_id, images = relocated.len(), "image links rewritten");
        Ok(page)
    }

    async fn append_comments(
        &self,
        comments: &[Comment],
        mut page: WorkingPage,
    ) -> Result<WorkingPage, MigrationError> {
        if comments.is_empty() {
            return Ok(page);
        }
        append_comment_section(&mut page.body, comments);
        self.gateway.update_page(&page.page_id, &page.body).await?;
        info!(page_id = %page.page_id, comments = comments.len(), "comments appended");
        Ok(page)
    }
}

/// HTML comment recording where the article came from, scheme stripped.
pub fn provenance_header(source_url: &str) -> String {
    let location = source_url
        .strip_prefix("https://")
        .or_else(|| source_url.strip_prefix("http://"))
        .unwrap_or(source_url);
    format!("<!-- Imported by\n{}\n-->\n\n", location)
}

/// Body of the first write: provenance header followed by the raw body.
pub fn initial_body(article: &Article) -> String {
    let mut body = provenance_header(&article.url);
    body.push_str(&article.body);
    body
}

/// Append the comment thread: one header, then one subsection per comment
/// in the given order.
pub fn append_comment_section(body: &mut String, comments: &[Comment]) {
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str(COMMENTS_HEADER);
    for comment in comments {
        body.push_str("## ");
        body.push_str(&comment.user.id);
        body.push('\n');
        body.push_str(&comment.body);
        if !comment.body.ends_with('\n') {
            body.push('\n');
        }
    }
}

/// Directory name for an article's downloaded artifacts: the export id
/// when it is filesystem-safe, else the article's position in the batch.
pub fn artifact_key(article: &Article, index: usize) -> String {
    let id = article.id.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        id.to_string()
    } else {
        format!("article-{}", index)
    }
}
