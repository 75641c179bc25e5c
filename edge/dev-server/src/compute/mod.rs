use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::Html;
use kv_assets::{AssetLayer, AssetOptions};
use miette::IntoDiagnostic;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::context::Context;

mod store;

use store::RedbStore;

const NOT_FOUND_PAGE: &str = include_str!("not_found.html");

pub async fn run(
    subsys: &mut SubsystemHandle,
    ctx: Context,
    store: String,
    options: AssetOptions,
    listen_addr: SocketAddr,
) -> miette::Result<()> {
    use tokio::net::TcpListener;

    let app = router(RedbStore::new(ctx.db.clone(), store.as_str()), options);

    let listener = TcpListener::bind(listen_addr).await.into_diagnostic()?;
    tracing::info!(store, "Edge server listening on {listen_addr}");

    let shutdown = subsys.create_cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .into_diagnostic()
}

/// Assets first, then the origin handler.
fn router(store: RedbStore, options: AssetOptions) -> axum::Router {
    axum::Router::new()
        .fallback(origin)
        .layer(AssetLayer::new(store).with_options(options))
        .layer(crate::util::trace_layer())
}

async fn origin() -> (StatusCode, Html<&'static str>) {
    (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE))
}
