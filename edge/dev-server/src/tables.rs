use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use redb::{ReadTransaction, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::util::JsonRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub kv_stores: HashMap<String, KVStoreMetadata>,
}

impl Metadata {
    /// Look a store up by id first, then by name.
    pub fn find_kv_store(&self, id_or_name: &str) -> Option<(&str, &KVStoreMetadata)> {
        if let Some((id, meta)) = self.kv_stores.get_key_value(id_or_name) {
            return Some((id.as_str(), meta));
        }

        self.kv_stores
            .iter()
            .find(|(_, meta)| meta.name == id_or_name)
            .map(|(id, meta)| (id.as_str(), meta))
    }
}

pub type MetaDataTable<'a> = TableDefinition<'a, (), JsonRecord<Metadata>>;

pub const METADATA_TABLE: MetaDataTable = TableDefinition::new("__meta__");

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KVStoreMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KVStoreItemMetadata {
    #[serde(with = "serde_with::As::<serde_with::base64::Base64>")]
    pub value: Bytes,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type KVStoreTable<'a> = TableDefinition<'a, String, JsonRecord<KVStoreItemMetadata>>;

pub fn load_metadata(
    table: &impl ReadableTable<(), JsonRecord<Metadata>>,
) -> Result<Metadata, redb::StorageError> {
    Ok(table
        .get(&())?
        .map(|record| record.value().0)
        .unwrap_or_default())
}

pub fn read_metadata(tx: &ReadTransaction) -> Result<Metadata, redb::Error> {
    match open_table(tx, METADATA_TABLE)? {
        Some(table) => Ok(load_metadata(&table)?),
        None => Ok(Metadata::default()),
    }
}

pub fn open_table<K: redb::Key, V: redb::Value>(
    tx: &ReadTransaction,
    table_def: TableDefinition<K, V>,
) -> Result<Option<redb::ReadOnlyTable<K, V>>, redb::Error> {
    match tx.open_table(table_def) {
        Ok(table) => Ok(Some(table)),
        Err(redb::TableError::TableDoesNotExist(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { generation: u64 },
    GenerationMismatch { current: u64 },
}

/// Insert or replace an item, bumping its generation.
///
/// With `if_generation_match`, the write only happens when the stored generation (0 for a
/// missing item) is equal to it.
pub fn write_item(
    table: &mut redb::Table<String, JsonRecord<KVStoreItemMetadata>>,
    key: &str,
    value: Bytes,
    metadata: Option<String>,
    if_generation_match: Option<u64>,
) -> Result<WriteOutcome, redb::StorageError> {
    let key = key.to_owned();
    let existing = table.get(&key)?.map(|record| record.value().0);
    let current = existing.as_ref().map_or(0, |item| item.generation);

    if if_generation_match.is_some_and(|expected| expected != current) {
        return Ok(WriteOutcome::GenerationMismatch { current });
    }

    let now = Utc::now();
    let item = KVStoreItemMetadata {
        value,
        metadata,
        generation: current + 1,
        created_at: existing.map_or(now, |item| item.created_at),
        updated_at: now,
    };
    table.insert(&key, &JsonRecord(item))?;

    Ok(WriteOutcome::Written {
        generation: current + 1,
    })
}
