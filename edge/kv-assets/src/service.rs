use std::pin::Pin;
use std::sync::Arc;
use std::task;

use axum::BoxError;
use axum::body::Body;
use bytes::Bytes;
use http::{Method, Request, Response};
use tower::{Layer, Service};

use crate::options::AssetOptions;
use crate::resolve::candidate_keys;
use crate::response::{AssetMetadata, AssetRequest, asset_response};
use crate::store::KvStore;

/// Answers requests from a KV store before they reach the wrapped service.
pub struct AssetLayer<K> {
    store: Arc<K>,
    options: Arc<AssetOptions>,
}

impl<K> AssetLayer<K> {
    pub fn new(store: K) -> Self {
        Self {
            store: Arc::new(store),
            options: Arc::new(AssetOptions::default()),
        }
    }

    pub fn with_options(mut self, options: AssetOptions) -> Self {
        self.options = Arc::new(options);
        self
    }
}

impl<K> Clone for AssetLayer<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S, K> Layer<S> for AssetLayer<K> {
    type Service = AssetService<S, K>;

    fn layer(&self, inner: S) -> Self::Service {
        AssetService {
            inner,
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

pub struct AssetService<S, K> {
    inner: S,
    store: Arc<K>,
    options: Arc<AssetOptions>,
}

impl<S: Clone, K> Clone for AssetService<S, K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            store: self.store.clone(),
            options: self.options.clone(),
        }
    }
}

impl<S, K, ReqBody, ResBody> Service<Request<ReqBody>> for AssetService<S, K>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    K: KvStore + 'static,
    ReqBody: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The ready service is moved into the future, its clone stays for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let store = self.store.clone();
        let options = self.options.clone();
        let asset_request = AssetRequest::from_request(&req);

        Box::pin(async move {
            if let Some(resp) = lookup(&*store, &options, &asset_request).await {
                return Ok(resp);
            }

            let resp = inner.call(req).await?;
            Ok(resp.map(Body::new))
        })
    }
}

/// Probe the candidate keys for `request` in order and build a response from the first hit.
///
/// Store errors are logged and treated as misses.
pub async fn lookup<K>(
    store: &K,
    options: &AssetOptions,
    request: &AssetRequest,
) -> Option<Response<Body>>
where
    K: KvStore + ?Sized,
{
    if !matches!(request.method, Method::GET | Method::HEAD) {
        return None;
    }

    let resolution = candidate_keys(&request.path, request.accept.as_deref(), options);

    for key in &resolution.keys {
        match store.get_with_metadata(key).await {
            Ok(Some(entry)) => {
                tracing::debug!(path = %request.path, %key, "serving asset");

                let metadata = AssetMetadata::parse(entry.metadata.as_deref());
                return Some(asset_response(
                    request,
                    key,
                    entry.value,
                    &metadata,
                    resolution.vary_accept,
                    options,
                ));
            }
            Ok(None) => tracing::trace!(%key, "asset miss"),
            Err(err) => tracing::warn!(%key, error = %err, "asset lookup failed"),
        }
    }

    None
}
