//! Serve pre-stored assets out of a key-value store in front of an HTTP handler.
//!
//! [`AssetLayer`] wraps any `tower` service. For `GET` and `HEAD` requests it computes an ordered
//! list of candidate keys from the request path and `Accept` header ([`candidate_keys`]), probes
//! the store for each in turn and answers with the first hit. Everything else, and every miss,
//! goes to the wrapped service.
//!
//! ```no_run
//! use std::convert::Infallible;
//!
//! use axum::body::Body;
//! use http::{Request, Response};
//! use kv_assets::{AssetLayer, MemoryStore};
//! use tower::ServiceBuilder;
//!
//! async fn handler(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
//!     Ok(Response::new(Body::from("dynamic")))
//! }
//!
//! let service = ServiceBuilder::new()
//!     .layer(AssetLayer::new(MemoryStore::new()))
//!     .service_fn(handler);
//! # drop(service);
//! ```

pub mod accept;
pub mod options;
pub mod resolve;
pub mod response;
pub mod service;
pub mod store;

pub use accept::Accept;
pub use options::{AssetOptions, Variant};
pub use resolve::{Resolution, candidate_keys};
pub use response::{AssetMetadata, AssetRequest};
pub use service::{AssetLayer, AssetService, lookup};
pub use store::{KvEntry, KvError, KvStore, MemoryStore, validate_key};
