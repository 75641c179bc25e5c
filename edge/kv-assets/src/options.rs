/// Alternative encoding of an asset, served when the client explicitly accepts its media type.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
#[builder(on(String, into))]
pub struct Variant {
    /// Media type that has to appear verbatim in `Accept`
    pub media_type: String,
    /// Extension replacing the source key's extension
    pub extension: String,
    /// Extensions of the keys this variant applies to
    pub source_extensions: Vec<String>,
}

impl Variant {
    pub fn applies_to(&self, extension: &str) -> bool {
        self.source_extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }
}

pub fn default_variants() -> Vec<Variant> {
    const RASTER: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

    vec![
        Variant::builder()
            .media_type("image/avif")
            .extension("avif")
            .source_extensions(Vec::from(RASTER.map(String::from)))
            .build(),
        Variant::builder()
            .media_type("image/webp")
            .extension("webp")
            .source_extensions(Vec::from(RASTER.map(String::from)))
            .build(),
    ]
}

#[derive(Debug, Clone, bon::Builder)]
#[builder(on(String, into))]
pub struct AssetOptions {
    /// Joined in front of every candidate key
    #[builder(default)]
    pub key_prefix: String,
    #[builder(default = "index.html".to_owned())]
    pub index_document: String,
    /// Try `<path>.html` for extension-less paths
    #[builder(default = true)]
    pub html_fallback: bool,
    #[builder(default = default_variants())]
    pub variants: Vec<Variant>,

    #[builder(default = "public, max-age=3600".to_owned())]
    pub cache_control: String,
    #[builder(default = "public, max-age=0, must-revalidate".to_owned())]
    pub html_cache_control: String,
    /// Used for file names carrying a content hash
    #[builder(default = "public, max-age=31536000, immutable".to_owned())]
    pub immutable_cache_control: String,

    #[builder(default = true)]
    pub etag: bool,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
