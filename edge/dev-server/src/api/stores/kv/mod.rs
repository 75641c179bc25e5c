use axum::extract::{Json, Path, State};
use chrono::{DateTime, Utc};
use redb::ReadableDatabase;
use serde::{Deserialize, Serialize};

use super::Router;
use crate::api::{Result, error::Error};
use crate::context::Context;
use crate::tables::{KVStoreMetadata, KVStoreTable, METADATA_TABLE, load_metadata, read_metadata};
use crate::util::JsonRecord;

mod keys;

#[derive(Debug, Clone, Serialize)]
struct KVStore {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl KVStore {
    fn new(id: &str, meta: &KVStoreMetadata) -> Self {
        Self {
            id: id.to_owned(),
            name: meta.name.clone(),
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct KVStoreListResponse {
    data: Vec<KVStore>,
}

pub fn router() -> Router {
    use axum::routing;

    Router::new()
        .route("/", routing::get(list_kv_stores).post(create_kv_store))
        .route("/{store}", routing::get(get_kv_store).delete(delete_kv_store))
        .merge(keys::router())
}

fn store_not_found() -> Error {
    Error::builder()
        .not_found()
        .message("KV store not found")
        .build()
}

async fn list_kv_stores(State(ctx): State<Context>) -> Result<Json<KVStoreListResponse>> {
    let tx = ctx.db.begin_read()?;
    let metadata = read_metadata(&tx)?;

    let mut data: Vec<_> = metadata
        .kv_stores
        .iter()
        .map(|(id, meta)| KVStore::new(id, meta))
        .collect();
    data.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(KVStoreListResponse { data }))
}

#[derive(Debug, Clone, Deserialize)]
struct CreateKVStoreRequest {
    name: String,
}

async fn create_kv_store(
    State(ctx): State<Context>,
    Json(payload): Json<CreateKVStoreRequest>,
) -> Result<Json<KVStore>> {
    if payload.name.trim().is_empty() {
        return Err(Error::builder()
            .bad_request()
            .message("KV store name cannot be empty")
            .build());
    }

    let tx = ctx.db.begin_write()?;

    let store = {
        let mut metadata_table = tx.open_table(METADATA_TABLE)?;
        let mut metadata = load_metadata(&metadata_table)?;

        if metadata.find_kv_store(&payload.name).is_some() {
            return Err(Error::builder()
                .conflict()
                .message("A KV store with this name already exists")
                .build());
        }

        let now = Utc::now();
        let id = ulid::Ulid::new().to_string();

        let store_meta = KVStoreMetadata {
            name: payload.name,
            created_at: now,
            updated_at: now,
        };
        let store = KVStore::new(&id, &store_meta);
        metadata.kv_stores.insert(id.clone(), store_meta);

        metadata_table.insert(&(), &JsonRecord(metadata))?;
        tx.open_table(KVStoreTable::new(&id))?;

        store
    };

    tx.commit()?;
    tracing::info!(store.id = store.id, store.name = store.name, "Created KV store");

    Ok(Json(store))
}

async fn get_kv_store(
    Path(store): Path<String>,
    State(ctx): State<Context>,
) -> Result<Json<KVStore>> {
    let tx = ctx.db.begin_read()?;
    let metadata = read_metadata(&tx)?;

    let (id, meta) = metadata.find_kv_store(&store).ok_or_else(store_not_found)?;

    Ok(Json(KVStore::new(id, meta)))
}

async fn delete_kv_store(Path(store): Path<String>, State(ctx): State<Context>) -> Result<()> {
    let tx = ctx.db.begin_write()?;

    let id = {
        let mut metadata_table = tx.open_table(METADATA_TABLE)?;
        let mut metadata = load_metadata(&metadata_table)?;

        let id = match metadata.find_kv_store(&store) {
            Some((id, _)) => id.to_owned(),
            None => return Err(store_not_found()),
        };
        metadata.kv_stores.remove(&id);

        metadata_table.insert(&(), &JsonRecord(metadata))?;
        id
    };

    tx.delete_table(KVStoreTable::new(&id))?;

    tx.commit()?;
    tracing::info!(store.id = id, "Deleted KV store");

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};

    use crate::api::test_util::{TestApi, json};

    #[tokio::test]
    async fn create_list_get_delete() {
        let api = TestApi::new();

        let created = api.create_store("assets").await;
        let id = created["id"].as_str().unwrap().to_owned();
        assert_eq!(created["name"], "assets");

        let resp = api
            .send(Request::get("/resources/stores/kv").body(Body::empty()).unwrap())
            .await;
        let list = json(resp).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);
        assert_eq!(list["data"][0]["id"], id.as_str());

        for reference in [id.as_str(), "assets"] {
            let resp = api
                .send(
                    Request::get(format!("/resources/stores/kv/{reference}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(json(resp).await["id"], id.as_str());
        }

        let resp = api
            .send(
                Request::delete("/resources/stores/kv/assets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = api
            .send(Request::get(format!("/resources/stores/kv/{id}")).body(Body::empty()).unwrap())
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(resp).await["message"], "KV store not found");
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let api = TestApi::new();
        api.create_store("assets").await;

        let req = Request::post("/resources/stores/kv")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"assets"}"#))
            .unwrap();
        let resp = api.send(req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn deleting_unknown_store_is_not_found() {
        let api = TestApi::new();

        let resp = api
            .send(Request::delete("/resources/stores/kv/nope").body(Body::empty()).unwrap())
            .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
