//! Cache key resolution: canonical primary keys and `Vary` variant keys.

use crate::cache::entry::CacheEntry;
use crate::http::message::{HttpRequest, Origin};

/// Canonical URI for an exchange, used as the top-level cache key.
/// Default ports are elided; any other port is serialized.
pub fn primary_key(origin: &Origin, request: &HttpRequest) -> String {
    let mut key = origin.to_string();
    let path = request.uri().path();
    if path.is_empty() {
        key.push('/');
    } else {
        key.push_str(path);
    }
    if let Some(q) = request.uri().query() {
        key.push('?');
        key.push_str(q);
    }
    key
}

/// Secondary key derived from the entry's `Vary` headers and the
/// request's values for them: `{name=value&name=value}` with names
/// lowercased and sorted, values form-urlencoded (space becomes `+`),
/// absent headers contributing an empty value.
pub fn variant_key(request: &HttpRequest, entry: &CacheEntry) -> String {
    let mut names: Vec<String> =
        entry.headers().tokens_of("vary").map(|t| t.to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();

    let mut out = String::from("{");
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(name);
        out.push('=');
        let value = request.headers().combined_value(name).unwrap_or_default();
        out.extend(url::form_urlencoded::byte_serialize(value.as_bytes()));
    }
    out.push('}');
    out
}

/// Storage key of a variant leaf: the variant key prepended to the
/// index's primary key.
pub fn variant_entry_key(variant: &str, primary: &str) -> String {
    let mut key = String::with_capacity(variant.len() + primary.len());
    key.push_str(variant);
    key.push_str(primary);
    key
}
