use headers::{Header, HeaderName, HeaderValue};

static GENERATION: HeaderName = HeaderName::from_static("generation");
static IF_GENERATION_MATCH: HeaderName = HeaderName::from_static("if-generation-match");
static METADATA: HeaderName = HeaderName::from_static("metadata");

/// Write counter of a KV item, returned on reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(pub u64);

/// Only write when the item is still at this generation (0 for "does not exist yet").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfGenerationMatch(pub u64);

/// Free-form metadata string attached to a KV item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata(pub String);

fn decode_str<'i, I>(values: &mut I) -> Result<&'i str, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    values
        .next()
        .ok_or_else(headers::Error::invalid)?
        .to_str()
        .map_err(|_| headers::Error::invalid())
}

impl Header for Generation {
    fn name() -> &'static HeaderName {
        &GENERATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let generation = decode_str(values)?
            .trim()
            .parse::<u64>()
            .map_err(|_| headers::Error::invalid())?;

        Ok(Generation(generation))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from(self.0)));
    }
}

impl Header for IfGenerationMatch {
    fn name() -> &'static HeaderName {
        &IF_GENERATION_MATCH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Generation::decode(values).map(|Generation(generation)| IfGenerationMatch(generation))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        Generation(self.0).encode(values);
    }
}

impl Header for Metadata {
    fn name() -> &'static HeaderName {
        &METADATA
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        decode_str(values).map(|value| Metadata(value.to_owned()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        // Values that cannot be carried in a header are left out.
        values.extend(HeaderValue::from_str(&self.0).ok());
    }
}

#[cfg(test)]
mod tests {
    use headers::HeaderMapExt;
    use http::HeaderMap;

    use super::*;

    #[test]
    fn generation_headers_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.typed_insert(Generation(42));
        headers.typed_insert(IfGenerationMatch(7));

        assert_eq!(headers["generation"], "42");
        assert_eq!(headers.typed_get::<Generation>(), Some(Generation(42)));
        assert_eq!(
            headers.typed_get::<IfGenerationMatch>(),
            Some(IfGenerationMatch(7))
        );
    }

    #[test]
    fn invalid_generation_is_an_error() {
        let mut headers = HeaderMap::new();
        headers.insert("if-generation-match", HeaderValue::from_static("soon"));

        assert!(headers.typed_try_get::<IfGenerationMatch>().is_err());
    }

    #[test]
    fn metadata_header() {
        let mut headers = HeaderMap::new();
        headers.typed_insert(Metadata(r#"{"content_type":"text/plain"}"#.to_owned()));
        assert_eq!(
            headers.typed_get::<Metadata>(),
            Some(Metadata(r#"{"content_type":"text/plain"}"#.to_owned()))
        );

        let mut headers = HeaderMap::new();
        headers.typed_insert(Metadata("line\nbreak".to_owned()));
        assert!(headers.typed_get::<Metadata>().is_none());
    }
}
