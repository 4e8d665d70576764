use bytes::Bytes;
use http::header::HeaderName;
use http::{Method, Version};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The callback surface an incremental HTTP/1.x parser drives.
///
/// Events for one connection arrive in byte order. Every boolean return is
/// a suspend request: `true` asks the parser to stop feeding events until
/// the connection resumes it, `false` to continue.
pub trait ParserEvents {
    /// Request line parsed. `version` is `None` for requests without one
    /// (treated as HTTP/0.9).
    fn start_request(
        &self,
        method: Method,
        raw_method: &str,
        uri: &str,
        version: Option<Version>,
    ) -> bool;

    /// One header field parsed. `header` identifies well-known names;
    /// `name` is `None` for folded continuation values; a `None` value is
    /// coerced to the empty string.
    fn parsed_header(
        &self,
        header: Option<HeaderName>,
        name: Option<&str>,
        value: Option<&str>,
    ) -> bool;

    /// The authority from the `Host` header (or request target).
    fn parsed_host_header(&self, host: &str, port: Option<u16>) -> bool;

    /// All headers parsed; the request may be dispatched.
    fn header_complete(&self) -> bool;

    /// A chunk of body content.
    fn content(&self, chunk: Bytes) -> bool;

    /// The message body is complete.
    fn message_complete(&self, content_length: u64) -> bool;

    /// The connection closed before the message was complete.
    fn early_eof(&self) -> bool;

    /// The request is malformed; no further events follow.
    fn bad_message(&self, status: u16, reason: Option<&str>);
}

/// A recognised `Expect` header token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// `100-continue`
    Continue,
    /// `102-processing`
    Processing,
}

static EXPECTATIONS: Lazy<HashMap<&'static str, Expectation>> = Lazy::new(|| {
    let mut cache = HashMap::new();
    cache.insert("100-continue", Expectation::Continue);
    cache.insert("102-processing", Expectation::Processing);
    cache
});

/// Look a single `Expect` token up in the interned value table.
pub fn lookup_expectation(token: &str) -> Option<Expectation> {
    EXPECTATIONS
        .get(token.trim().to_ascii_lowercase().as_str())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_expectations() {
        assert_eq!(lookup_expectation("100-continue"), Some(Expectation::Continue));
        assert_eq!(
            lookup_expectation(" 102-Processing "),
            Some(Expectation::Processing)
        );
    }

    #[test]
    fn test_unknown_expectation() {
        assert_eq!(lookup_expectation("x-weird"), None);
    }
}
