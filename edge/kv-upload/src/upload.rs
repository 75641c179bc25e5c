use bytes::Bytes;
use kv_assets::{AssetMetadata, KvStore, validate_key};

use crate::walk::AssetFile;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Joined in front of every key with a `/`
    pub prefix: Option<String>,
}

impl UploadOptions {
    pub fn key_for(&self, file: &AssetFile) -> String {
        match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{}", file.key),
            _ => file.key.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl UploadSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Metadata stored next to each uploaded file.
pub fn metadata_for(key: &str) -> AssetMetadata {
    let content_type = mime_guess::from_path(key)
        .first()
        .map(|mime| mime.essence_str().to_owned());

    AssetMetadata {
        content_type,
        cache_control: None,
    }
}

/// Put every file into `store`, one after the other.
///
/// Invalid keys are skipped and failed reads or writes are counted; neither stops the upload.
pub async fn upload_dir<K>(store: &K, files: &[AssetFile], options: &UploadOptions) -> UploadSummary
where
    K: KvStore + ?Sized,
{
    let mut summary = UploadSummary::default();

    for file in files {
        let key = options.key_for(file);

        if let Err(err) = validate_key(&key) {
            tracing::warn!(%key, error = %err, "Skipping file");
            summary.skipped += 1;
            continue;
        }

        let value = match tokio::fs::read(&file.path).await {
            Ok(value) => Bytes::from(value),
            Err(err) => {
                tracing::error!(path = %file.path.display(), error = %err, "Failed to read file");
                summary.failed += 1;
                continue;
            }
        };
        let size = value.len() as u64;

        let metadata = match serde_json::to_string(&metadata_for(&key)) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                tracing::warn!(%key, error = %err, "Uploading without metadata");
                None
            }
        };

        match store.put(&key, value, metadata).await {
            Ok(()) => {
                tracing::info!(%key, size, "Uploaded");
                summary.uploaded += 1;
                summary.bytes += size;
            }
            Err(err) => {
                tracing::error!(%key, error = %err, "Upload failed");
                summary.failed += 1;
            }
        }
    }

    summary
}
