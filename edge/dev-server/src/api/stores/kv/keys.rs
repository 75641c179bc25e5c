use axum::extract::{Json, Path, Query, State};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use headers::HeaderMapExt;
use http::HeaderMap;
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use super::store_not_found;
use crate::api::util::{Generation, IfGenerationMatch, Metadata};
use crate::api::{Result, Router, error::Error};
use crate::context::Context;
use crate::tables::{
    KVStoreTable, METADATA_TABLE, WriteOutcome, load_metadata, open_table, read_metadata,
    write_item,
};

pub fn router() -> Router {
    use axum::routing;

    Router::new()
        .route("/{store}/keys", routing::get(list_kv_keys))
        .route(
            "/{store}/keys/{key}",
            routing::get(get_kv_item)
                .put(upsert_kv_item)
                .delete(delete_kv_item),
        )
}

fn item_not_found() -> Error {
    Error::builder()
        .not_found()
        .message("KV store item not found")
        .build()
}

#[derive(Debug, Clone, Serialize)]
struct KVKey {
    key: String,
    size: usize,
    generation: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListKeysQuery {
    prefix: Option<String>,
}

async fn list_kv_keys(
    Path(store): Path<String>,
    Query(query): Query<ListKeysQuery>,
    State(ctx): State<Context>,
) -> Result<Json<Vec<KVKey>>> {
    let tx = ctx.db.begin_read()?;
    let metadata = read_metadata(&tx)?;
    let (id, _) = metadata.find_kv_store(&store).ok_or_else(store_not_found)?;

    let Some(table) = open_table(&tx, KVStoreTable::new(id))? else {
        return Ok(Json(vec![]));
    };
    let prefix = query.prefix.unwrap_or_default();

    let mut entries = Vec::new();
    for entry in table.iter()? {
        let (key, record) = entry?;
        let item_key = key.value();
        if !item_key.starts_with(&prefix) {
            continue;
        }
        let item = record.value().0;

        entries.push(KVKey {
            key: item_key,
            size: item.value.len(),
            generation: item.generation,
            created_at: item.created_at,
            updated_at: item.updated_at,
        });
    }

    Ok(Json(entries))
}

async fn get_kv_item(
    Path((store, key)): Path<(String, String)>,
    State(ctx): State<Context>,
) -> Result<(HeaderMap, Bytes)> {
    let tx = ctx.db.begin_read()?;
    let metadata = read_metadata(&tx)?;
    let (id, _) = metadata.find_kv_store(&store).ok_or_else(store_not_found)?;

    let Some(table) = open_table(&tx, KVStoreTable::new(id))? else {
        return Err(item_not_found());
    };
    let Some(item) = table.get(&key)?.map(|record| record.value().0) else {
        return Err(item_not_found());
    };

    let mut headers = HeaderMap::new();
    headers.typed_insert(Generation(item.generation));
    if let Some(metadata) = item.metadata {
        headers.typed_insert(Metadata(metadata));
    }

    Ok((headers, item.value))
}

async fn upsert_kv_item(
    Path((store, key)): Path<(String, String)>,
    State(ctx): State<Context>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<HeaderMap> {
    if let Err(err) = kv_assets::validate_key(&key) {
        return Err(Error::builder()
            .bad_request()
            .message(err.to_string())
            .build());
    }

    let if_generation_match = headers
        .typed_try_get::<IfGenerationMatch>()
        .map_err(|_| {
            Error::builder()
                .bad_request()
                .message("Invalid if-generation-match header")
                .build()
        })?
        .map(|IfGenerationMatch(generation)| generation);
    let item_metadata = headers.typed_get::<Metadata>().map(|Metadata(value)| value);

    let tx = ctx.db.begin_write()?;

    let outcome = {
        let id = {
            let metadata_table = tx.open_table(METADATA_TABLE)?;
            let metadata = load_metadata(&metadata_table)?;
            match metadata.find_kv_store(&store) {
                Some((id, _)) => id.to_owned(),
                None => return Err(store_not_found()),
            }
        };

        let mut table = tx.open_table(KVStoreTable::new(&id))?;

        write_item(&mut table, &key, body, item_metadata, if_generation_match)?
    };

    let generation = match outcome {
        WriteOutcome::Written { generation } => generation,
        WriteOutcome::GenerationMismatch { current } => {
            tracing::debug!(key, current, "Generation mismatch");
            return Err(Error::builder()
                .precondition_failed()
                .message("Item generation does not match")
                .build());
        }
    };

    tx.commit()?;

    let mut headers = HeaderMap::new();
    headers.typed_insert(Generation(generation));

    Ok(headers)
}

async fn delete_kv_item(
    Path((store, key)): Path<(String, String)>,
    State(ctx): State<Context>,
) -> Result<()> {
    let tx = ctx.db.begin_write()?;

    {
        let id = {
            let metadata_table = tx.open_table(METADATA_TABLE)?;
            let metadata = load_metadata(&metadata_table)?;
            match metadata.find_kv_store(&store) {
                Some((id, _)) => id.to_owned(),
                None => return Err(store_not_found()),
            }
        };

        let mut table = tx.open_table(KVStoreTable::new(&id))?;

        if table.remove(&key)?.is_none() {
            return Err(item_not_found());
        }
    }

    tx.commit()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};

    use crate::api::test_util::{TestApi, body, json};

    #[tokio::test]
    async fn put_get_list_delete() {
        let api = TestApi::new();
        api.create_store("assets").await;

        let req = Request::put("/resources/stores/kv/assets/keys/img%2Fcat.png")
            .header("metadata", r#"{"content_type":"image/png"}"#)
            .body(Body::from("png"))
            .unwrap();
        let resp = api.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["generation"], "1");

        let resp = api
            .send(
                Request::get("/resources/stores/kv/assets/keys/img%2Fcat.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["generation"], "1");
        assert_eq!(
            resp.headers()["metadata"],
            r#"{"content_type":"image/png"}"#
        );
        assert_eq!(body(resp).await, "png");

        let req = Request::put("/resources/stores/kv/assets/keys/index.html")
            .body(Body::from("<html>"))
            .unwrap();
        api.send(req).await;

        let resp = api
            .send(
                Request::get("/resources/stores/kv/assets/keys?prefix=img/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let keys = json(resp).await;
        assert_eq!(keys.as_array().unwrap().len(), 1);
        assert_eq!(keys[0]["key"], "img/cat.png");
        assert_eq!(keys[0]["size"], 3);

        let resp = api
            .send(
                Request::delete("/resources/stores/kv/assets/keys/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = api
            .send(
                Request::delete("/resources/stores/kv/assets/keys/index.html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_keys_in_key_order() {
        let api = TestApi::new();
        api.create_store("assets").await;

        for key in ["js%2Fapp.js", "css%2Fsite.css", "index.html", "css%2Freset.css"] {
            let req = Request::put(format!("/resources/stores/kv/assets/keys/{key}"))
                .body(Body::from("x"))
                .unwrap();
            assert_eq!(api.send(req).await.status(), StatusCode::OK);
        }

        assert_eq!(
            list_keys(&api, "/resources/stores/kv/assets/keys").await,
            ["css/reset.css", "css/site.css", "index.html", "js/app.js"]
        );
        assert_eq!(
            list_keys(&api, "/resources/stores/kv/assets/keys?prefix=css/").await,
            ["css/reset.css", "css/site.css"]
        );
        assert!(
            list_keys(&api, "/resources/stores/kv/assets/keys?prefix=img/")
                .await
                .is_empty()
        );
    }

    async fn list_keys(api: &TestApi, uri: &str) -> Vec<String> {
        let resp = api.send(Request::get(uri).body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        json(resp)
            .await
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["key"].as_str().unwrap().to_owned())
            .collect()
    }

    #[tokio::test]
    async fn generation_preconditions() {
        let api = TestApi::new();
        api.create_store("assets").await;

        let create = Request::put("/resources/stores/kv/assets/keys/a.txt")
            .header("if-generation-match", "0")
            .body(Body::from("one"))
            .unwrap();
        assert_eq!(api.send(create).await.headers()["generation"], "1");

        let stale = Request::put("/resources/stores/kv/assets/keys/a.txt")
            .header("if-generation-match", "0")
            .body(Body::from("two"))
            .unwrap();
        assert_eq!(api.send(stale).await.status(), StatusCode::PRECONDITION_FAILED);

        let invalid = Request::put("/resources/stores/kv/assets/keys/a.txt")
            .header("if-generation-match", "latest")
            .body(Body::from("two"))
            .unwrap();
        assert_eq!(api.send(invalid).await.status(), StatusCode::BAD_REQUEST);

        let fresh = Request::put("/resources/stores/kv/assets/keys/a.txt")
            .header("if-generation-match", "1")
            .body(Body::from("two"))
            .unwrap();
        assert_eq!(api.send(fresh).await.headers()["generation"], "2");
    }

    #[tokio::test]
    async fn invalid_keys_and_unknown_stores() {
        let api = TestApi::new();
        api.create_store("assets").await;

        let req = Request::put("/resources/stores/kv/assets/keys/a%0Ab")
            .body(Body::from("x"))
            .unwrap();
        assert_eq!(api.send(req).await.status(), StatusCode::BAD_REQUEST);

        let req = Request::put("/resources/stores/kv/other/keys/a.txt")
            .body(Body::from("x"))
            .unwrap();
        assert_eq!(api.send(req).await.status(), StatusCode::NOT_FOUND);

        let req = Request::get("/resources/stores/kv/assets/keys/missing")
            .body(Body::empty())
            .unwrap();
        let resp = api.send(req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(resp).await["message"], "KV store item not found");
    }
}
