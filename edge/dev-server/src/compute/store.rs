use std::sync::Arc;

use bytes::Bytes;
use kv_assets::{KvEntry, KvError, KvStore};
use redb::{Database, ReadableDatabase, ReadableTable};

use crate::tables::{
    KVStoreItemMetadata, KVStoreTable, METADATA_TABLE, WriteOutcome, load_metadata, open_table,
    read_metadata, write_item,
};

/// A [`KvStore`] over one of the dev server's persistent stores, referenced by id or name.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    store: String,
}

impl RedbStore {
    pub fn new(db: Arc<Database>, store: impl Into<String>) -> Self {
        Self {
            db,
            store: store.into(),
        }
    }

    fn read(&self, key: &str) -> Result<Option<KVStoreItemMetadata>, redb::Error> {
        let tx = self.db.begin_read()?;

        let metadata = read_metadata(&tx)?;
        let Some((id, _)) = metadata.find_kv_store(&self.store) else {
            tracing::debug!(store = self.store, "KV store does not exist");
            return Ok(None);
        };
        let Some(table) = open_table(&tx, KVStoreTable::new(id))? else {
            return Ok(None);
        };

        let item = table.get(key.to_owned())?.map(|record| record.value().0);
        Ok(item)
    }

    fn write(&self, key: &str, value: Bytes, metadata: Option<String>) -> Result<(), KvError> {
        let tx = self.db.begin_write().map_err(KvError::backend)?;

        {
            let id = {
                let metadata_table = tx.open_table(METADATA_TABLE).map_err(KvError::backend)?;
                let metadata = load_metadata(&metadata_table).map_err(KvError::backend)?;
                match metadata.find_kv_store(&self.store) {
                    Some((id, _)) => id.to_owned(),
                    None => {
                        return Err(KvError::backend(format!(
                            "KV store `{}` not found",
                            self.store
                        )));
                    }
                }
            };

            let mut table = tx
                .open_table(KVStoreTable::new(&id))
                .map_err(KvError::backend)?;

            let outcome =
                write_item(&mut table, key, value, metadata, None).map_err(KvError::backend)?;
            if let WriteOutcome::GenerationMismatch { current } = outcome {
                return Err(KvError::backend(format!(
                    "generation mismatch for `{key}` (current {current})"
                )));
            }
        }

        tx.commit().map_err(KvError::backend)
    }
}

#[async_trait::async_trait]
impl KvStore for RedbStore {
    async fn get_with_metadata(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        let this = self.clone();
        let key = key.to_owned();

        let item = tokio::task::spawn_blocking(move || this.read(&key))
            .await
            .map_err(KvError::backend)?
            .map_err(KvError::backend)?;

        Ok(item.map(|item| KvEntry {
            value: item.value,
            metadata: item.metadata,
        }))
    }

    async fn put(&self, key: &str, value: Bytes, metadata: Option<String>) -> Result<(), KvError> {
        kv_assets::validate_key(key)?;

        let this = self.clone();
        let key = key.to_owned();

        tokio::task::spawn_blocking(move || this.write(&key, value, metadata))
            .await
            .map_err(KvError::backend)?
    }
}
