use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use qiita2crowi::batch::BatchCoordinator;
use qiita2crowi::config::{self, Overrides};
use qiita2crowi::crowi::{self, CrowiClient};
use qiita2crowi::fetch::HttpFetcher;
use qiita2crowi::migrate::ArticleMigrator;
use qiita2crowi::model::Export;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Migrate a Qiita:Team JSON export into a Crowi wiki"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Crowi base URL
    #[arg(long)]
    crowi_url: Option<String>,

    /// Crowi API access token
    #[arg(long)]
    access_token: Option<String>,

    /// Page path under which articles are created (default: /qiita)
    #[arg(long)]
    page_path: Option<String>,

    /// Qiita:Team access token for private image URLs
    #[arg(long)]
    qiita_token: Option<String>,

    /// Export JSON file (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Maximum number of articles migrated at once (default: 4)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for downloaded images (default: ./qiita-assets)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            crowi_url: self.crowi_url.clone(),
            access_token: self.access_token.clone(),
            page_path: self.page_path.clone(),
            qiita_token: self.qiita_token.clone(),
            concurrency: self.concurrency,
            work_dir: self.work_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cfg = config::resolve(args.config.as_deref(), args.overrides())?;
    cfg.ensure_dirs()
        .with_context(|| format!("failed to create {}", cfg.migration.work_dir.display()))?;

    let export = match &args.input {
        Some(path) => Export::from_path(path)
            .with_context(|| format!("failed to decode {}", path.display()))?,
        None => Export::from_reader(std::io::stdin().lock()).context("failed to decode stdin")?,
    };
    info!(
        version = %export.version,
        articles = export.articles.len(),
        projects = export.projects.len(),
        "export loaded"
    );

    let http = crowi::http_client(cfg.http.timeout()).context("failed to build HTTP client")?;
    let gateway = Arc::new(CrowiClient::from_config(http.clone(), &cfg)?);
    let assets = Arc::new(HttpFetcher::from_config(http, &cfg));
    let migrator = ArticleMigrator::new(
        gateway,
        assets,
        cfg.migration.page_path.clone(),
        cfg.migration.work_dir.clone(),
    );

    let report = BatchCoordinator::new(migrator, cfg.migration.concurrency)
        .run(export.articles)
        .await;

    if !report.is_success() {
        for failure in &report.failures {
            let stage = failure.stage.map(|s| s.as_str()).unwrap_or("task");
            error!(title = %failure.title, stage, reason = %failure.reason, "not migrated");
        }
        error!("Failures {}/{} pages", report.failed, report.total);
        return Ok(ExitCode::FAILURE);
    }

    info!("migrated {} pages", report.succeeded);
    Ok(ExitCode::SUCCESS)
}
