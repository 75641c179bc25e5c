use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header};
use serde::{Deserialize, Serialize};

use crate::options::AssetOptions;
use crate::resolve::extension;

const HASH_MIN_LEN: usize = 8;

/// Per-asset overrides, stored as JSON in the KV entry metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl AssetMetadata {
    /// Unparseable metadata is treated as absent.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        serde_json::from_str(raw).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "ignoring invalid asset metadata");
            Self::default()
        })
    }
}

/// The `Content-Type` for `key`. Text, JavaScript and JSON types without a charset get `utf-8`,
/// whether they come from the metadata or from the extension.
pub fn content_type(key: &str, metadata: &AssetMetadata) -> String {
    use mime_guess::mime::{self, Mime};

    let mime = match &metadata.content_type {
        Some(content_type) => match content_type.parse::<Mime>() {
            Ok(mime) => mime,
            Err(_) => return content_type.clone(),
        },
        None => mime_guess::from_path(key).first_or_octet_stream(),
    };

    let needs_charset =
        mime.type_() == mime::TEXT || matches!(mime.subtype().as_str(), "javascript" | "json");

    if needs_charset && mime.get_param(mime::CHARSET).is_none() {
        format!("{mime}; charset=utf-8")
    } else {
        mime.to_string()
    }
}

pub fn cache_control<'a>(
    key: &str,
    content_type: &str,
    metadata: &'a AssetMetadata,
    options: &'a AssetOptions,
) -> &'a str {
    if let Some(cache_control) = &metadata.cache_control {
        cache_control
    } else if is_hashed(key) {
        &options.immutable_cache_control
    } else if content_type.starts_with("text/html") {
        &options.html_cache_control
    } else {
        &options.cache_control
    }
}

/// Whether the file name carries a content hash, as in `app.3f2a9c1d.js` or `chunk-0a1b2c3d4e.css`.
///
/// All-digit parts such as the date in `report-20240115.pdf` are not hashes.
pub fn is_hashed(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    let Some(ext) = extension(name) else {
        return false;
    };
    let stem = &name[..name.len() - ext.len() - 1];

    stem.split(['.', '-'])
        .skip(1)
        .any(|part| {
            part.len() >= HASH_MIN_LEN
                && part.bytes().all(|b| b.is_ascii_hexdigit())
                && part.bytes().any(|b| b.is_ascii_alphabetic())
        })
}

pub fn etag(value: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(value);
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();

    format!("\"{hex}\"")
}

fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// Everything about the request that affects the asset response.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub method: Method,
    pub path: String,
    pub accept: Option<String>,
    pub headers: HeaderMap,
}

impl AssetRequest {
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        let accept = req
            .headers()
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut headers = HeaderMap::new();
        for value in req.headers().get_all(header::IF_NONE_MATCH) {
            headers.append(header::IF_NONE_MATCH, value.clone());
        }

        Self {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            accept,
            headers,
        }
    }
}

pub fn asset_response(
    request: &AssetRequest,
    key: &str,
    value: Bytes,
    metadata: &AssetMetadata,
    vary_accept: bool,
    options: &AssetOptions,
) -> Response<Body> {
    let content_type = content_type(key, metadata);
    let cache_control = cache_control(key, &content_type, metadata, options);

    let mut headers = HeaderMap::new();
    insert(&mut headers, header::CACHE_CONTROL, cache_control);
    if vary_accept {
        headers.insert(header::VARY, HeaderValue::from_static("accept"));
    }

    if options.etag {
        let tag = etag(&value);
        insert(&mut headers, header::ETAG, &tag);

        if if_none_match(&request.headers, &tag) {
            return build(StatusCode::NOT_MODIFIED, headers, Body::empty());
        }
    }

    insert(&mut headers, header::CONTENT_TYPE, &content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(value.len()));

    let body = if request.method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(value)
    };

    build(StatusCode::OK, headers, body)
}

fn insert(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value, "dropping invalid header value"),
    }
}

fn build(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method) -> AssetRequest {
        AssetRequest {
            method,
            path: "/".into(),
            accept: None,
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn content_type_from_extension() {
        let none = AssetMetadata::default();

        assert_eq!(content_type("index.html", &none), "text/html; charset=utf-8");
        assert_eq!(content_type("a/site.css", &none), "text/css; charset=utf-8");
        assert!(content_type("app.js", &none).ends_with("/javascript; charset=utf-8"));
        assert_eq!(content_type("data.json", &none), "application/json; charset=utf-8");
        assert_eq!(content_type("cat.png", &none), "image/png");
        assert_eq!(content_type("about", &none), "application/octet-stream");
    }

    #[test]
    fn content_type_from_metadata_wins() {
        let metadata = AssetMetadata {
            content_type: Some("text/markdown".into()),
            cache_control: None,
        };

        assert_eq!(content_type("about", &metadata), "text/markdown; charset=utf-8");

        let with = |value: &str| AssetMetadata {
            content_type: Some(value.into()),
            cache_control: None,
        };
        assert_eq!(content_type("index.html", &with("text/html")), "text/html; charset=utf-8");
        assert_eq!(
            content_type("page.html", &with("text/html; charset=iso-8859-1")),
            "text/html; charset=iso-8859-1"
        );
        assert_eq!(content_type("cat.bin", &with("image/png")), "image/png");
        assert_eq!(content_type("odd", &with("not a mime")), "not a mime");
    }

    #[test]
    fn metadata_parsing_is_lenient() {
        assert_eq!(AssetMetadata::parse(None), AssetMetadata::default());
        assert_eq!(AssetMetadata::parse(Some("not json")), AssetMetadata::default());
        assert_eq!(
            AssetMetadata::parse(Some(r#"{"content_type":"image/png","other":1}"#)),
            AssetMetadata {
                content_type: Some("image/png".into()),
                cache_control: None,
            }
        );
    }

    #[test]
    fn hashed_file_names() {
        assert!(is_hashed("assets/app.3f2a9c1d.js"));
        assert!(is_hashed("chunk-0a1b2c3d4e.css"));
        assert!(!is_hashed("app.js"));
        assert!(!is_hashed("deadbeefcafe.js"));
        assert!(!is_hashed("app.min.js"));
        assert!(!is_hashed("app.3f2a.js"));
        assert!(!is_hashed("LICENSE"));
        assert!(!is_hashed("report-20240115.pdf"));
        assert!(!is_hashed("backup.20240115123000.tar"));
        assert!(is_hashed("app.12345678a.js"));
    }

    #[test]
    fn cache_control_selection() {
        let options = AssetOptions::default();
        let none = AssetMetadata::default();

        assert_eq!(
            cache_control("app.3f2a9c1d.js", "text/javascript", &none, &options),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(
            cache_control("index.html", "text/html; charset=utf-8", &none, &options),
            "public, max-age=0, must-revalidate"
        );
        assert_eq!(
            cache_control("cat.png", "image/png", &none, &options),
            "public, max-age=3600"
        );

        let metadata = AssetMetadata {
            content_type: None,
            cache_control: Some("no-store".into()),
        };
        assert_eq!(
            cache_control("app.3f2a9c1d.js", "text/javascript", &metadata, &options),
            "no-store"
        );
    }

    #[test]
    fn etag_is_stable_and_quoted() {
        let tag = etag(b"hello");

        assert_eq!(tag, etag(b"hello"));
        assert_ne!(tag, etag(b"world"));
        assert_eq!(tag.len(), 18);
        assert!(tag.starts_with('"') && tag.ends_with('"'));
    }

    #[test]
    fn builds_full_response() {
        let options = AssetOptions::default();
        let response = asset_response(
            &request(Method::GET),
            "cat.png",
            Bytes::from_static(b"png"),
            &AssetMetadata::default(),
            true,
            &options,
        );

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CONTENT_LENGTH], "3");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(headers[header::VARY], "accept");
        assert_eq!(headers[header::ETAG], etag(b"png"));
    }

    #[test]
    fn matching_if_none_match_is_not_modified() {
        let options = AssetOptions::default();
        let mut req = request(Method::GET);
        req.headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"other\", W/{}", etag(b"body"))).unwrap(),
        );

        let response = asset_response(
            &req,
            "a.txt",
            Bytes::from_static(b"body"),
            &AssetMetadata::default(),
            false,
            &options,
        );

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().contains_key(header::ETAG));
        assert!(!response.headers().contains_key(header::CONTENT_LENGTH));
        assert!(!response.headers().contains_key(header::VARY));
    }

    #[test]
    fn etag_can_be_disabled() {
        let options = AssetOptions::builder().etag(false).build();
        let mut req = request(Method::GET);
        req.headers
            .insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));

        let response = asset_response(
            &req,
            "a.txt",
            Bytes::from_static(b"body"),
            &AssetMetadata::default(),
            false,
            &options,
        );

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(header::ETAG));
    }
}
