use smallvec::SmallVec;
use std::fmt;
use std::time::{Duration, UNIX_EPOCH};

/// Number of header fields stored inline before spilling to the heap.
pub const MAX_INLINE_FIELDS: usize = 16;

/// A single header field as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    name: String,
    value: String,
}

impl HeaderField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

type FieldVec = SmallVec<[HeaderField; MAX_INLINE_FIELDS]>;

/// Insertion-order preserving header multimap with case-insensitive lookup.
///
/// Uses SmallVec to avoid heap allocation for messages with ≤16 fields.
/// Names keep their original spelling for serialization; lookup ignores case.
#[derive(Debug, Clone, Default)]
pub struct HeaderFields {
    fields: FieldVec,
}

impl HeaderFields {
    pub fn new() -> Self {
        Self {
            fields: FieldVec::new(),
        }
    }

    /// Append a field, keeping any existing fields with the same name.
    pub fn add(&mut self, name: &str, value: &str) {
        self.fields.push(HeaderField {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Replace every field of this name with a single value.
    pub fn put(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.add(name, value);
    }

    /// Replace every field of this name with an RFC 1123 date built from
    /// milliseconds since the UNIX epoch.
    pub fn put_date(&mut self, name: &str, epoch_millis: u64) {
        let time = UNIX_EPOCH + Duration::from_millis(epoch_millis);
        self.put(name, &httpdate::fmt_http_date(time));
    }

    /// First value for the name, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    /// All values for the name, in insertion order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True when any field of this name carries the token, either as the
    /// whole value or as an element of a comma-separated list. Comparison is
    /// case-insensitive, matching `Connection: keep-alive` / `close` usage.
    pub fn contains_value(&self, name: &str, token: &str) -> bool {
        self.values(name)
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    }

    /// Remove every field of this name, returning whether any was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before != self.fields.len()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }
}

impl fmt::Display for HeaderFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name, field.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut fields = HeaderFields::new();
        fields.add("Host", "example.com");
        fields.add("Accept", "text/html");
        fields.add("Accept", "application/json");
        let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["Host", "Accept", "Accept"]);
        let accepts: Vec<&str> = fields.values("accept").collect();
        assert_eq!(accepts, vec!["text/html", "application/json"]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut fields = HeaderFields::new();
        fields.add("Content-Type", "text/plain");
        assert_eq!(fields.get("content-type"), Some("text/plain"));
        assert!(fields.contains("CONTENT-TYPE"));
    }

    #[test]
    fn test_contains_value_splits_comma_lists() {
        let mut fields = HeaderFields::new();
        fields.add("Connection", "Upgrade, Keep-Alive");
        assert!(fields.contains_value("connection", "keep-alive"));
        assert!(fields.contains_value("connection", "upgrade"));
        assert!(!fields.contains_value("connection", "close"));
    }

    #[test]
    fn test_put_replaces_all_values() {
        let mut fields = HeaderFields::new();
        fields.add("X-Test", "a");
        fields.add("X-Test", "b");
        fields.put("x-test", "c");
        let values: Vec<&str> = fields.values("X-Test").collect();
        assert_eq!(values, vec!["c"]);
    }

    #[test]
    fn test_put_date_renders_rfc1123() {
        let mut fields = HeaderFields::new();
        fields.put_date("Date", 0);
        assert_eq!(fields.get("Date"), Some("Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_remove() {
        let mut fields = HeaderFields::new();
        fields.add("A", "1");
        fields.add("B", "2");
        assert!(fields.remove("a"));
        assert!(!fields.remove("a"));
        assert_eq!(fields.len(), 1);
    }
}
