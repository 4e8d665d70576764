use std::str::Utf8Error;

/// Mutable URI scratch buffer reused across requests of one connection.
///
/// Understands origin-form (`/path?query`), absolute-form
/// (`http://host:port/path`) and the authority-form used by CONNECT
/// (`host:port`). The path is kept raw; decoding happens on demand so a
/// decode failure can fall back to ISO-8859-1.
#[derive(Debug, Clone, Default)]
pub struct HttpUri {
    raw: String,
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl HttpUri {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an origin-form or absolute-form request target.
    pub fn parse(&mut self, raw: &str) {
        self.clear();
        self.raw = raw.to_string();

        let mut rest = raw;
        if !raw.starts_with('/') && !raw.starts_with('*') {
            if let Some(pos) = raw.find("://") {
                self.scheme = Some(raw[..pos].to_string());
                rest = &raw[pos + 3..];
                let authority_end = rest.find('/').unwrap_or(rest.len());
                self.set_authority(&rest[..authority_end]);
                rest = &rest[authority_end..];
                if rest.is_empty() {
                    rest = "/";
                }
            }
        }

        match rest.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query = Some(query.to_string());
            }
            None => self.path = rest.to_string(),
        }
    }

    /// Parse the authority-form target of a CONNECT request (`host[:port]`).
    pub fn parse_authority(&mut self, raw: &str) {
        self.clear();
        self.raw = raw.to_string();
        self.set_authority(raw);
    }

    fn set_authority(&mut self, authority: &str) {
        match authority.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
                self.host = Some(host.to_string());
                self.port = port.parse().ok();
            }
            _ => self.host = Some(authority.to_string()),
        }
    }

    pub fn clear(&mut self) {
        self.raw.clear();
        self.scheme = None;
        self.host = None;
        self.port = None;
        self.path.clear();
        self.query = None;
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Raw, undecoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Percent-decoded path interpreted as UTF-8.
    pub fn decoded_path(&self) -> Result<String, Utf8Error> {
        let bytes = percent_decode(&self.path);
        std::str::from_utf8(&bytes).map(str::to_string)
    }

    /// Percent-decoded path interpreted as ISO-8859-1. Cannot fail: every
    /// byte maps to exactly one character.
    pub fn decoded_path_latin1(&self) -> String {
        percent_decode(&self.path)
            .into_iter()
            .map(|b| b as char)
            .collect()
    }
}

/// Decode `%XX` escapes into raw bytes. Malformed escapes pass through
/// literally rather than failing the request.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(hex) = bytes.get(i + 1..i + 3).and_then(|h| std::str::from_utf8(h).ok()) {
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Canonicalise a decoded path: collapse `.` segments, resolve `..`
/// segments, preserve the absolute prefix and a trailing slash. Returns
/// `None` when `..` would climb past the root.
pub fn canonical_path(path: &str) -> Option<String> {
    if path.is_empty() {
        return Some(String::new());
    }

    let absolute = path.starts_with('/');
    let directory = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return None;
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(path.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if directory && !out.ends_with('/') {
        out.push('/');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origin_form() {
        let mut uri = HttpUri::new();
        uri.parse("/a/b?x=1");
        assert_eq!(uri.path(), "/a/b");
        assert_eq!(uri.query(), Some("x=1"));
        assert_eq!(uri.host(), None);
    }

    #[test]
    fn test_parse_absolute_form() {
        let mut uri = HttpUri::new();
        uri.parse("http://example.com:8080/index?q=2");
        assert_eq!(uri.scheme(), Some("http"));
        assert_eq!(uri.host(), Some("example.com"));
        assert_eq!(uri.port(), Some(8080));
        assert_eq!(uri.path(), "/index");
        assert_eq!(uri.query(), Some("q=2"));
    }

    #[test]
    fn test_parse_authority_form() {
        let mut uri = HttpUri::new();
        uri.parse_authority("proxy.local:443");
        assert_eq!(uri.host(), Some("proxy.local"));
        assert_eq!(uri.port(), Some(443));
        assert_eq!(uri.path(), "");
    }

    #[test]
    fn test_percent_decode_utf8() {
        let mut uri = HttpUri::new();
        uri.parse("/caf%C3%A9");
        assert_eq!(uri.decoded_path().unwrap(), "/café");
    }

    #[test]
    fn test_invalid_utf8_falls_back_to_latin1() {
        let mut uri = HttpUri::new();
        uri.parse("/caf%E9");
        assert!(uri.decoded_path().is_err());
        assert_eq!(uri.decoded_path_latin1(), "/café");
    }

    #[test]
    fn test_malformed_escape_passes_through() {
        assert_eq!(percent_decode("/a%zz"), b"/a%zz".to_vec());
        assert_eq!(percent_decode("/a%2"), b"/a%2".to_vec());
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path("/a/./b/../c"), Some("/a/c".to_string()));
        assert_eq!(canonical_path("/"), Some("/".to_string()));
        assert_eq!(canonical_path("/a/b/"), Some("/a/b/".to_string()));
        assert_eq!(canonical_path("/a/.."), Some("/".to_string()));
        assert_eq!(canonical_path("/.."), None);
        assert_eq!(canonical_path("/a/../../b"), None);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut uri = HttpUri::new();
        uri.parse("http://h:1/p?q");
        uri.clear();
        assert_eq!(uri.raw(), "");
        assert_eq!(uri.path(), "");
        assert_eq!(uri.host(), None);
        assert_eq!(uri.query(), None);
    }
}
