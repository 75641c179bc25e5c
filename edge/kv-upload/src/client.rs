use bytes::Bytes;
use kv_assets::{KvEntry, KvError, KvStore};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{Result, UploadError};

const METADATA_HEADER: &str = "metadata";

/// Characters left as-is in a key path segment; everything else, `/` included, is escaped.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, Deserialize)]
pub struct StoreInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct StoreList {
    data: Vec<StoreInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// A [`KvStore`] backed by the dev server's KV store API.
#[derive(Debug, Clone)]
pub struct ApiStore {
    client: Client,
    base_url: String,
    store: String,
}

impl ApiStore {
    pub fn new(base_url: &str, store: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            store: store.into(),
        }
    }

    fn stores_url(&self) -> String {
        format!("{}/resources/stores/kv", self.base_url)
    }

    fn key_url(&self, key: &str) -> String {
        format!(
            "{}/{}/keys/{}",
            self.stores_url(),
            utf8_percent_encode(&self.store, KEY_SEGMENT),
            utf8_percent_encode(key, KEY_SEGMENT)
        )
    }

    /// Find the target store, creating it when it does not exist.
    pub async fn ensure_store(&self) -> Result<StoreInfo> {
        let resp = self.client.get(self.stores_url()).send().await?;
        let list: StoreList = check(resp).await?.json().await?;

        if let Some(store) = list
            .data
            .into_iter()
            .find(|store| store.id == self.store || store.name == self.store)
        {
            return Ok(store);
        }

        let resp = self
            .client
            .post(self.stores_url())
            .json(&serde_json::json!({ "name": self.store }))
            .send()
            .await?;
        let store: StoreInfo = check(resp).await?.json().await?;
        tracing::info!(store.id = store.id, store.name = store.name, "Created KV store");

        Ok(store)
    }
}

/// Turn non-success responses into errors carrying the API's message.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.bytes().await.unwrap_or_default();
    let message = serde_json::from_slice::<ApiErrorBody>(&body)
        .map(|err| err.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());

    Err(UploadError::ApiStatus { status, message })
}

#[async_trait::async_trait]
impl KvStore for ApiStore {
    async fn get_with_metadata(&self, key: &str) -> std::result::Result<Option<KvEntry>, KvError> {
        let resp = self
            .client
            .get(self.key_url(key))
            .send()
            .await
            .map_err(KvError::backend)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await.map_err(KvError::backend)?;

        let metadata = resp
            .headers()
            .get(METADATA_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let value = resp.bytes().await.map_err(KvError::backend)?;

        Ok(Some(KvEntry { value, metadata }))
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        metadata: Option<String>,
    ) -> std::result::Result<(), KvError> {
        kv_assets::validate_key(key)?;

        let mut req = self.client.put(self.key_url(key)).body(value);
        if let Some(metadata) = metadata {
            req = req.header(METADATA_HEADER, metadata);
        }

        let resp = req.send().await.map_err(KvError::backend)?;
        check(resp).await.map_err(KvError::backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    #[test]
    fn keys_are_encoded_as_one_segment() {
        let store = ApiStore::new("http://localhost:7677/", "assets");

        assert_eq!(
            store.key_url("img/my cat.png"),
            "http://localhost:7677/resources/stores/kv/assets/keys/img%2Fmy%20cat.png"
        );
    }

    #[tokio::test]
    async fn put_sends_value_and_metadata() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path_contains("/resources/stores/kv/assets/keys/")
                    .path_contains("site.css")
                    .header("metadata", r#"{"content_type":"text/css"}"#)
                    .body("body{}");
                then.status(200).header("generation", "1");
            })
            .await;

        let store = ApiStore::new(&server.base_url(), "assets");
        store
            .put(
                "css/site.css",
                Bytes::from_static(b"body{}"),
                Some(r#"{"content_type":"text/css"}"#.into()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_maps_not_found_to_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/resources/stores/kv/assets/keys/missing");
                then.status(404)
                    .json_body(serde_json::json!({ "message": "KV store item not found" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/resources/stores/kv/assets/keys/index.html");
                then.status(200)
                    .header("metadata", "{}")
                    .body("<h1>");
            })
            .await;

        let store = ApiStore::new(&server.base_url(), "assets");

        assert_eq!(store.get_with_metadata("missing").await.unwrap(), None);
        assert_eq!(
            store.get_with_metadata("index.html").await.unwrap(),
            Some(KvEntry::new(Bytes::from_static(b"<h1>")).with_metadata("{}"))
        );
    }

    #[tokio::test]
    async fn api_errors_surface_their_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT);
                then.status(404)
                    .json_body(serde_json::json!({ "message": "KV store not found" }));
            })
            .await;

        let store = ApiStore::new(&server.base_url(), "assets");
        let err = store
            .put("a.txt", Bytes::from_static(b"a"), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("KV store not found"), "{err}");
    }

    #[tokio::test]
    async fn ensure_store_reuses_or_creates() {
        let server = MockServer::start_async().await;
        let list = server
            .mock_async(|when, then| {
                when.method(GET).path("/resources/stores/kv");
                then.status(200).json_body(serde_json::json!({
                    "data": [{ "id": "01OTHER", "name": "other" }]
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/resources/stores/kv")
                    .json_body(serde_json::json!({ "name": "assets" }));
                then.status(200)
                    .json_body(serde_json::json!({ "id": "01ASSETS", "name": "assets" }));
            })
            .await;

        let created = ApiStore::new(&server.base_url(), "assets")
            .ensure_store()
            .await
            .unwrap();
        assert_eq!(created.id, "01ASSETS");

        let existing = ApiStore::new(&server.base_url(), "other")
            .ensure_store()
            .await
            .unwrap();
        assert_eq!(existing.id, "01OTHER");

        list.assert_hits_async(2).await;
        create.assert_hits_async(1).await;
    }
}
