use std::fmt;
use std::time::Duration;

use opentelemetry_semantic_conventions::attribute as otel;
use serde::{de::DeserializeOwned, ser::Serialize};
use tower_http::trace::{self, DefaultOnRequest, HttpMakeClassifier, TraceLayer};
use tracing::field;

pub type OtelTraceLayer =
    TraceLayer<HttpMakeClassifier, OtelTrace, DefaultOnRequest, OtelTrace, (), (), OtelTrace>;

pub fn trace_layer() -> OtelTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(OtelTrace)
        .on_response(OtelTrace)
        .on_body_chunk(())
        .on_eos(())
        .on_failure(OtelTrace)
}

#[derive(Debug, Clone, Copy)]
pub struct OtelTrace;

impl<B> trace::MakeSpan<B> for OtelTrace {
    fn make_span(&mut self, request: &http::Request<B>) -> tracing::Span {
        use axum::extract::MatchedPath;

        let path = if let Some(matched_path) = request.extensions().get::<MatchedPath>() {
            matched_path.as_str()
        } else {
            request.uri().path()
        };

        tracing::debug_span!(
            "request",
            otel.name = format!("{} {path}", request.method()),
            otel.kind = "server",
            { otel::HTTP_REQUEST_METHOD } = %request.method(),
            { otel::HTTP_ROUTE } = path,
            { otel::URL_FULL } = %request.uri(),
            { otel::NETWORK_PROTOCOL_NAME } = "http",
            { otel::NETWORK_PROTOCOL_VERSION } = ?request.version(),
            { otel::OTEL_STATUS_CODE } = field::Empty,
            { otel::HTTP_RESPONSE_STATUS_CODE } = field::Empty,
            http.response.body.size = field::Empty,
            http.response.header.content_type = field::Empty,
        )
    }
}

impl<B> trace::OnResponse<B> for OtelTrace {
    fn on_response(self, response: &http::Response<B>, _latency: Duration, span: &tracing::Span) {
        let code = if response.status().is_server_error() {
            "ERROR"
        } else {
            "OK"
        };

        span.record(otel::OTEL_STATUS_CODE, code);
        span.record(otel::HTTP_RESPONSE_STATUS_CODE, response.status().as_u16());

        let headers = response.headers();
        if let Some(size) = headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok()?.parse::<u64>().ok())
        {
            span.record("http.response.body.size", size);
        }
        if let Some(content_type) = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            span.record("http.response.header.content_type", content_type);
        }
    }
}

impl<B> trace::OnFailure<B> for OtelTrace {
    fn on_failure(&mut self, _failure_classification: B, _latency: Duration, span: &tracing::Span) {
        span.record(otel::OTEL_STATUS_CODE, "ERROR");
    }
}

/// A `redb` value stored as JSON.
pub struct JsonRecord<T>(pub T);

impl<T> redb::Value for JsonRecord<T>
where
    T: fmt::Debug + Serialize + DeserializeOwned,
{
    type SelfType<'a>
        = JsonRecord<T>
    where
        T: 'a;

    type AsBytes<'a>
        = Vec<u8>
    where
        Self: 'a;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        // Records are only ever written by `as_bytes`.
        let value = serde_json::from_slice(data).expect("failed to deserialize json record");
        JsonRecord(value)
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        serde_json::to_vec(&value.0).expect("failed to serialize json record")
    }

    fn type_name() -> redb::TypeName {
        redb::TypeName::new("Json")
    }
}

impl<T: fmt::Debug> fmt::Debug for JsonRecord<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Json").field(&self.0).finish()
    }
}
