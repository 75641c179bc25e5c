//! Upload a directory of static assets into a KV store, one key per file.

pub mod client;
pub mod error;
pub mod upload;
pub mod walk;

pub use client::{ApiStore, StoreInfo};
pub use error::{Result, UploadError};
pub use upload::{UploadOptions, UploadSummary, upload_dir};
pub use walk::{AssetFile, collect_files};
