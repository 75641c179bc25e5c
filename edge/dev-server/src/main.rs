use std::path::PathBuf;

use clap::Parser;
use miette::Result;

mod api;
mod cli;
mod compute;
mod context;
mod tables;
mod trace;
mod util;

#[derive(Debug, Parser)]
#[clap(version, about)]
struct Options {
    /// Path to the persistent store
    #[clap(
        long,
        global = true,
        default_value = "./kv-assets.db",
        env = "KV_ASSETS_STORE_PATH"
    )]
    pub store_path: PathBuf,

    /// Export traces over OTLP (configured through the standard OTEL_* variables)
    #[clap(long, global = true, env = "KV_ASSETS_OTLP")]
    pub otlp: bool,

    #[clap(subcommand)]
    pub command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Options::parse();

    let _guard = trace::setup_tracing(opts.otlp)?;

    let ctx = context::Context::new(&opts.store_path)?;

    cli::run(opts.command, ctx).await
}
