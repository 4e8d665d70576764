use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Interned charset lookup for the content types commonly seen on the wire.
/// Misses fall through to the tolerant `charset=` parameter parser.
static CHARSET_CACHE: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut cache = HashMap::new();
    cache.insert("text/html;charset=utf-8", "utf-8");
    cache.insert("text/html;charset=iso-8859-1", "iso-8859-1");
    cache.insert("text/plain;charset=utf-8", "utf-8");
    cache.insert("text/plain;charset=iso-8859-1", "iso-8859-1");
    cache.insert("text/xml;charset=utf-8", "utf-8");
    cache.insert("text/json;charset=utf-8", "utf-8");
    cache.insert("application/json;charset=utf-8", "utf-8");
    cache.insert("application/xml;charset=utf-8", "utf-8");
    cache.insert(
        "application/x-www-form-urlencoded;charset=utf-8",
        "utf-8",
    );
    cache
});

/// Extract the charset of a `Content-Type` value.
///
/// Common full values hit the interned table; anything else is scanned for a
/// `charset=` parameter, tolerating whitespace, quoting and mixed case.
pub fn charset_from_content_type(value: &str) -> Option<String> {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if let Some(charset) = CHARSET_CACHE.get(normalized.as_str()) {
        return Some((*charset).to_string());
    }

    let pos = normalized.find("charset=")?;
    let mut charset = &normalized[pos + "charset=".len()..];
    if let Some(end) = charset.find(';') {
        charset = &charset[..end];
    }
    let charset = charset.trim_matches('"');
    if charset.is_empty() {
        None
    } else {
        Some(charset.to_string())
    }
}
