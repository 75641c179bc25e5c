use std::net::SocketAddr;

use kv_assets::AssetOptions;
use miette::IntoDiagnostic;

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Options {
    /// Address to bind the HTTP server to
    #[clap(long, default_value = "127.0.0.1:7676", env = "KV_ASSETS_HTTP_ADDR")]
    pub http_addr: SocketAddr,
    /// Address to bind the API server to
    #[clap(long, default_value = "127.0.0.1:7677", env = "KV_ASSETS_API_ADDR")]
    pub api_addr: SocketAddr,

    /// KV store (id or name) to serve assets from
    #[clap(long, default_value = "assets", env = "KV_ASSETS_STORE")]
    pub store: String,
    /// Prefix joined in front of every asset key
    #[clap(long, env = "KV_ASSETS_KEY_PREFIX")]
    pub key_prefix: Option<String>,
    /// Document served for directory paths
    #[clap(long, env = "KV_ASSETS_INDEX_DOCUMENT")]
    pub index_document: Option<String>,

    /// Cache-Control for regular assets
    #[clap(long, env = "KV_ASSETS_CACHE_CONTROL")]
    pub cache_control: Option<String>,
    /// Cache-Control for HTML documents
    #[clap(long, env = "KV_ASSETS_HTML_CACHE_CONTROL")]
    pub html_cache_control: Option<String>,
    /// Cache-Control for file names carrying a content hash
    #[clap(long, env = "KV_ASSETS_IMMUTABLE_CACHE_CONTROL")]
    pub immutable_cache_control: Option<String>,

    /// Do not try `<path>.html` for extension-less paths
    #[clap(long)]
    pub no_html_fallback: bool,
    /// Do not serve AVIF/WebP variants based on `Accept`
    #[clap(long)]
    pub no_negotiation: bool,
    /// Do not send ETags or answer conditional requests
    #[clap(long)]
    pub no_etag: bool,
}

impl Options {
    pub fn asset_options(&self) -> AssetOptions {
        AssetOptions::builder()
            .maybe_key_prefix(self.key_prefix.clone())
            .maybe_index_document(self.index_document.clone())
            .maybe_cache_control(self.cache_control.clone())
            .maybe_html_cache_control(self.html_cache_control.clone())
            .maybe_immutable_cache_control(self.immutable_cache_control.clone())
            .html_fallback(!self.no_html_fallback)
            .maybe_variants(self.no_negotiation.then(Vec::new))
            .etag(!self.no_etag)
            .build()
    }
}

pub async fn run(opts: Options, ctx: Context) -> miette::Result<()> {
    use std::time::Duration;

    use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

    let asset_options = opts.asset_options();
    tracing::debug!(?asset_options, "Asset options");

    Toplevel::new(async move |s: &mut SubsystemHandle| {
        let api_subsys = SubsystemBuilder::new("api", {
            let ctx = ctx.clone();
            let listen_addr = opts.api_addr;

            async move |subsys: &mut SubsystemHandle| crate::api::run(subsys, ctx, listen_addr).await
        });
        s.start(api_subsys);

        let compute_subsys = SubsystemBuilder::new("compute", {
            let ctx = ctx.clone();
            let store = opts.store.clone();
            let listen_addr = opts.http_addr;

            async move |subsys: &mut SubsystemHandle| {
                crate::compute::run(subsys, ctx, store, asset_options, listen_addr).await
            }
        });
        s.start(compute_subsys);
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(1000))
    .await
    .into_diagnostic()
}
