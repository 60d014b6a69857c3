//! Runs every article of an export through the migrator with bounded
//! concurrency and tallies the outcomes.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info};

use crate::migrate::{artifact_key, ArticleMigrator, MigrationOutcome, Stage};
use crate::model::Article;

/// Caps how many migrations are in flight and remembers the highest
/// occupancy it has seen.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Held for the duration of one migration; dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    gate: Arc<AdmissionGate>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Admission {
    fn drop(&mut self) {
        // Runs before the permit field is released.
        self.gate.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    /// A limit of zero is raised to one.
    pub fn new(limit: usize) -> Arc<Self> {
        let limit = limit.max(1);
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub async fn admit(self: &Arc<Self>) -> Result<Admission, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Admission {
            gate: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFailure {
    pub title: String,
    /// `None` when the migration task itself died.
    pub stage: Option<Stage>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub peak_in_flight: usize,
    pub failures: Vec<ArticleFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct BatchCoordinator {
    migrator: Arc<ArticleMigrator>,
    gate: Arc<AdmissionGate>,
    failures: Arc<AtomicUsize>,
}

impl BatchCoordinator {
    pub fn new(migrator: ArticleMigrator, concurrency: usize) -> Self {
        Self {
            migrator: Arc::new(migrator),
            gate: AdmissionGate::new(concurrency),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Migrate every article and wait for all of them. One article failing
    /// never stops the others.
    pub async fn run(self, articles: Vec<Article>) -> BatchReport {
        let total = articles.len();
        info!(total, concurrency = self.gate.limit(), "migration started");

        let mut tasks = Vec::with_capacity(total);
        for (index, article) in articles.into_iter().enumerate() {
            let migrator = Arc::clone(&self.migrator);
            let gate = Arc::clone(&self.gate);
            let failures = Arc::clone(&self.failures);
            let title = article.title.clone();
            let handle = tokio::spawn(async move {
                let _admission = match gate.admit().await {
                    Ok(admission) => admission,
                    Err(err) => {
                        failures.fetch_add(1, Ordering::SeqCst);
                        return Err(ArticleFailure {
                            title: article.title,
                            stage: None,
                            reason: err.to_string(),
                        });
                    }
                };
                let key = artifact_key(&article, index);
                match migrator.migrate(&article, &key).await {
                    MigrationOutcome::Succeeded {
                        page_id,
                        relocated_images,
                    } => {
                        info!(title = %article.title, page_id = %page_id, images = relocated_images, "article migrated");
                        Ok(())
                    }
                    MigrationOutcome::Failed { stage, reason } => {
                        failures.fetch_add(1, Ordering::SeqCst);
                        error!(title = %article.title, stage = %stage, error = %reason, "article failed");
                        Err(ArticleFailure {
                            title: article.title,
                            stage: Some(stage),
                            reason: reason.to_string(),
                        })
                    }
                }
            });
            tasks.push((title, handle));
        }

        let (titles, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut report_failures = Vec::new();
        for (title, result) in titles.into_iter().zip(results) {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => report_failures.push(failure),
                Err(join_err) => {
                    self.failures.fetch_add(1, Ordering::SeqCst);
                    error!(title = %title, error = %join_err, "migration task aborted");
                    report_failures.push(ArticleFailure {
                        title,
                        stage: None,
                        reason: format!("migration task aborted: {}", join_err),
                    });
                }
            }
        }

        let failed = self.failures.load(Ordering::SeqCst);
        let report = BatchReport {
            total,
            succeeded: total - failed,
            failed,
            peak_in_flight: self.gate.peak(),
            failures: report_failures,
        };
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "migration finished"
        );
        report
    }
}
