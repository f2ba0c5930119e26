//! Ordered key/value document container.
//!
//! Key order is part of the wire contract, so the backing store is a plain
//! `Vec<(String, Value)>` rather than a hash container. Lookups are linear;
//! command bodies and replies are small enough that this never matters.

use std::fmt;

use crate::codec::Value;

/// An ordered mapping from string keys to [`Value`]s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a key/value pair.
    ///
    /// An existing key keeps its position and has its value replaced
    /// (returned); a new key is appended at the end.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        for (existing, slot) in self.entries.iter_mut() {
            if *existing == key {
                return Some(std::mem::replace(slot, value));
            }
        }
        self.entries.push((key, value));
        None
    }

    /// Append an entry without checking for an existing key.
    ///
    /// Used by the decoder so that wire bytes with duplicate keys round-trip
    /// unchanged.
    pub(crate) fn push_entry(&mut self, key: String, value: Value) {
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    // Typed accessors for the common reply fields.

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(Value::as_i32)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key).and_then(Value::as_document)
    }

    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_array)
    }

    /// Numeric field widened to f64, whatever width the server chose.
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_number)
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

impl fmt::Display for Document {
    /// Extended JSON rendering; 64-bit and decimal values keep their
    /// precision markers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::codec::extended::document_to_json(self))
    }
}

/// Construct a [`Document`] with ordered `key => value` pairs.
///
/// ```
/// use docwire_client::doc;
///
/// let body = doc! {
///     "count" => "profiles",
///     "$db" => "juanportal",
/// };
/// assert_eq!(body.get_str("count"), Some("profiles"));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::codec::Document::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut document = $crate::codec::Document::new();
        $(document.insert($key, $value);)+
        document
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut doc = Document::new();
        doc.insert("zebra", 1i32);
        doc.insert("apple", 2i32);
        doc.insert("mango", 3i32);

        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut doc = Document::new();
        doc.insert("a", 1i32);
        doc.insert("b", 2i32);
        let old = doc.insert("a", 10i32);

        assert_eq!(old, Some(Value::Int32(1)));
        assert_eq!(doc.len(), 2);
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(doc.get_i32("a"), Some(10));
    }

    #[test]
    fn test_remove() {
        let mut doc = doc! { "a" => 1i32, "b" => 2i32 };
        assert_eq!(doc.remove("a"), Some(Value::Int32(1)));
        assert_eq!(doc.remove("a"), None);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_typed_accessors() {
        let doc = doc! {
            "name" => "profile",
            "count" => 5i32,
            "size" => 1024i64,
            "ok" => 1.0,
            "archived" => false,
        };

        assert_eq!(doc.get_str("name"), Some("profile"));
        assert_eq!(doc.get_i32("count"), Some(5));
        assert_eq!(doc.get_i64("size"), Some(1024));
        assert_eq!(doc.get_f64("ok"), Some(1.0));
        assert_eq!(doc.get_bool("archived"), Some(false));
        assert_eq!(doc.get_str("missing"), None);
        assert_eq!(doc.get_number("count"), Some(5.0));
    }

    #[test]
    fn test_doc_macro_empty() {
        let doc = doc! {};
        assert!(doc.is_empty());
    }

    #[test]
    fn test_nested_document() {
        let doc = doc! {
            "filter" => doc! { "status" => "active" },
        };
        let filter = doc.get_document("filter").unwrap();
        assert_eq!(filter.get_str("status"), Some("active"));
    }

    #[test]
    fn test_from_iterator() {
        let doc: Document = vec![
            ("a".to_string(), Value::Int32(1)),
            ("b".to_string(), Value::Int32(2)),
        ]
        .into_iter()
        .collect();
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
