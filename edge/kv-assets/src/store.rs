use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;

pub const MAX_KEY_LEN: usize = 1024;

const ACME_CHALLENGE_PREFIX: &str = ".well-known/acme-challenge/";

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum KvError {
    #[error("invalid key {key:?}: {reason}")]
    #[diagnostic(code(kv::invalid_key))]
    InvalidKey { key: String, reason: &'static str },

    #[error("kv backend error: {message}")]
    #[diagnostic(code(kv::backend))]
    Backend { message: String },
}

impl KvError {
    pub fn backend(err: impl fmt::Display) -> Self {
        KvError::Backend {
            message: err.to_string(),
        }
    }
}

/// A value stored under a key, with its optional metadata string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Bytes,
    pub metadata: Option<String>,
}

impl KvEntry {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// An eventually-consistent key-value store addressed by plain string keys.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, KvError> {
        Ok(self.get_with_metadata(key).await?.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<String>) -> Result<(), KvError>;
}

#[async_trait::async_trait]
impl<K: KvStore + ?Sized> KvStore for Arc<K> {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        (**self).get_with_metadata(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, KvError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<String>) -> Result<(), KvError> {
        (**self).put(key, value, metadata).await
    }
}

/// Check a key against the rules every store enforces on writes.
pub fn validate_key(key: &str) -> Result<(), KvError> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.len() > MAX_KEY_LEN {
        "key is longer than 1024 bytes"
    } else if key == "." || key == ".." {
        "key cannot be `.` or `..`"
    } else if key.contains(['\r', '\n']) {
        "key contains a line break"
    } else if key.starts_with(ACME_CHALLENGE_PREFIX) {
        "key is under .well-known/acme-challenge/"
    } else {
        return Ok(());
    };

    Err(KvError::InvalidKey {
        key: key.to_owned(),
        reason,
    })
}

/// In-process store; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, KvEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<String>) -> Result<(), KvError> {
        validate_key(key)?;

        let entry = KvEntry { value, metadata };
        self.entries.write().await.insert(key.to_owned(), entry);

        Ok(())
    }
}
