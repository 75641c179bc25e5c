use std::path::PathBuf;

use clap::Parser;
use kv_assets::MemoryStore;
use kv_upload::{ApiStore, UploadOptions, UploadSummary, collect_files, upload_dir};
use miette::Result;

#[derive(Debug, Parser)]
#[clap(version, about)]
struct Options {
    /// Directory to upload
    pub dir: PathBuf,

    /// Base URL of the KV store API
    #[clap(long, default_value = "http://127.0.0.1:7677", env = "KV_ASSETS_API_URL")]
    pub api_url: String,
    /// KV store (id or name) to upload into
    #[clap(long, default_value = "assets", env = "KV_ASSETS_STORE")]
    pub store: String,
    /// Prefix joined in front of every key
    #[clap(long, env = "KV_ASSETS_KEY_PREFIX")]
    pub prefix: Option<String>,

    /// Create the store if it does not exist
    #[clap(long)]
    pub create_store: bool,
    /// Upload dot-files and dot-directories too
    #[clap(long)]
    pub include_hidden: bool,
    /// Walk the directory and compute keys without contacting the API
    #[clap(long)]
    pub dry_run: bool,
}

fn setup_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Options::parse();

    setup_tracing();

    let files = collect_files(&opts.dir, opts.include_hidden)?;
    tracing::info!(count = files.len(), dir = %opts.dir.display(), "Collected files");

    let options = UploadOptions {
        prefix: opts.prefix.clone(),
    };

    let summary = if opts.dry_run {
        upload_dir(&MemoryStore::new(), &files, &options).await
    } else {
        let store = ApiStore::new(&opts.api_url, opts.store.clone());
        if opts.create_store {
            store.ensure_store().await?;
        }
        upload_dir(&store, &files, &options).await
    };

    report(&summary);

    if !summary.is_success() {
        miette::bail!("{} of {} uploads failed", summary.failed, files.len());
    }

    Ok(())
}

fn report(summary: &UploadSummary) {
    tracing::info!(
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        failed = summary.failed,
        bytes = summary.bytes,
        "Upload finished"
    );
}
