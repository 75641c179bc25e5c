use std::net::SocketAddr;

use miette::IntoDiagnostic;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::context::Context;

mod error;
mod stores;
mod util;

type Result<T> = std::result::Result<T, error::Error>;
type Router = axum::Router<Context>;

pub async fn run(
    subsys: &mut SubsystemHandle,
    ctx: Context,
    listen_addr: SocketAddr,
) -> miette::Result<()> {
    use tokio::net::TcpListener;

    let app = router().with_state(ctx);

    let listener = TcpListener::bind(listen_addr).await.into_diagnostic()?;
    tracing::info!("API server listening on {listen_addr}");

    let shutdown = subsys.create_cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .into_diagnostic()
}

fn router() -> Router {
    Router::new()
        .nest("/resources/stores", stores::router())
        .layer(crate::util::trace_layer())
}
