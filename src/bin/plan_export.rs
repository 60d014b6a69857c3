use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qiita2crowi::config;
use qiita2crowi::images::find_images;
use qiita2crowi::model::Export;
use qiita2crowi::path::title_path;

/// Show what a migration would do without touching the network.
#[derive(Parser, Debug)]
#[command(author, version, about = "Preview the pages a Qiita:Team export would produce")]
struct Args {
    /// Export JSON file
    #[arg(long)]
    input: PathBuf,

    /// Optional YAML config; its page path is used unless --page-path is given
    #[arg(long)]
    config: Option<PathBuf>,

    /// Page path under which articles would be created
    #[arg(long)]
    page_path: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let page_path = match args.page_path {
        Some(p) => p,
        None => config::load(args.config.as_deref())?.migration.page_path,
    };
    let export = Export::from_path(&args.input)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;

    let mut invalid = 0;
    let mut images = 0;
    for article in &export.articles {
        match title_path(&page_path, &article.title) {
            Ok(path) => println!("{}", path),
            Err(err) => {
                invalid += 1;
                println!("!! {:?}: {}", article.title, err);
                continue;
            }
        }
        for url in find_images(&article.rendered_body) {
            images += 1;
            println!("  image {}", url);
        }
        if !article.comments.is_empty() {
            let commenters: Vec<&str> = article.commenters().collect();
            println!("  comments {} ({})", commenters.len(), commenters.join(", "));
        }
    }

    println!("================================");
    println!(
        "{} articles, {} images, {} invalid titles",
        export.articles.len(),
        images,
        invalid
    );
    Ok(())
}
