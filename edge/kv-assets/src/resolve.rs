//! Mapping of a request path and `Accept` header to the ordered list of KV keys to probe.

use percent_encoding::percent_decode_str;

use crate::accept::Accept;
use crate::options::AssetOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub keys: Vec<String>,
    /// Whether the chosen key may depend on the `Accept` header
    pub vary_accept: bool,
}

/// A request path reduced to its significant segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPath {
    pub key: String,
    pub directory: bool,
}

/// Decode and clean a URL path. `None` means the path can never name an asset.
pub fn normalize_path(path: &str) -> Option<NormalizedPath> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;

    let mut segments = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains(['\0', '\\']) => return None,
            s => segments.push(s),
        }
    }

    Some(NormalizedPath {
        key: segments.join("/"),
        directory: segments.is_empty() || decoded.ends_with('/'),
    })
}

/// Extension of the last path segment, if it has a non-empty stem and suffix.
pub fn extension(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

pub fn candidate_keys(path: &str, accept: Option<&str>, options: &AssetOptions) -> Resolution {
    let Some(normalized) = normalize_path(path) else {
        return Resolution::default();
    };

    let accept = accept.map(Accept::parse).unwrap_or_default();

    let mut keys = Vec::new();
    let mut vary_accept = false;

    for base in base_keys(&normalized, options) {
        let (variants, negotiable) = variant_keys(&base, &accept, options);
        vary_accept |= negotiable;

        keys.extend(variants);
        keys.push(base);
    }

    let mut resolved: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = with_prefix(&options.key_prefix, &key);
        if !resolved.contains(&key) {
            resolved.push(key);
        }
    }

    Resolution {
        keys: resolved,
        vary_accept,
    }
}

fn base_keys(path: &NormalizedPath, options: &AssetOptions) -> Vec<String> {
    let index = options.index_document.as_str();

    if path.directory {
        return vec![join(&path.key, index)];
    }

    if extension(&path.key).is_some() {
        return vec![path.key.clone()];
    }

    let mut keys = vec![path.key.clone()];
    if options.html_fallback {
        keys.push(format!("{}.html", path.key));
    }
    keys.push(join(&path.key, index));
    keys
}

/// Variant keys accepted by the client, best first, and whether any variant applies at all.
fn variant_keys(key: &str, accept: &Accept, options: &AssetOptions) -> (Vec<String>, bool) {
    let Some(ext) = extension(key) else {
        return (vec![], false);
    };

    let applicable: Vec<_> = options
        .variants
        .iter()
        .filter(|variant| variant.applies_to(ext))
        .collect();
    if applicable.is_empty() {
        return (vec![], false);
    }

    let mut accepted: Vec<_> = applicable
        .into_iter()
        .filter_map(|variant| {
            let quality = accept.explicit_quality(&variant.media_type)?;
            (quality > 0.0).then_some((quality, variant))
        })
        .collect();
    // Stable sort keeps configuration order among equal qualities.
    accepted.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    let stem = &key[..key.len() - ext.len()];
    let keys = accepted
        .into_iter()
        .map(|(_, variant)| format!("{stem}{}", variant.extension))
        .collect();

    (keys, true)
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

fn with_prefix(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}/{key}")
    }
}
