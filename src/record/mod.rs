//! Record data model
//!
//! A [`Record`] is one structured item extracted from a single page: a map
//! from field name to extracted value, plus the implicit `site`, `url`, and
//! `fetched_at` fields every record carries. A [`RecordBatch`] is the ordered
//! sequence of records one site's crawl accumulated, in page-fetch order.

mod value;

pub use value::FieldValue;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use url::Url;

/// Ordered sequence of records for one site crawl
///
/// Append-only while the crawl runs; the post-processing engine consumes it
/// read-only afterwards.
pub type RecordBatch = Vec<Record>;

/// One extracted item
///
/// Field names are unique; iteration order is the field names' sort order,
/// which keeps serialized output deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Creates an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record pre-populated with the implicit context fields
    ///
    /// Every record produced by a crawl carries the resolved site name, the
    /// final URL the page was fetched from, and the fetch timestamp.
    pub fn with_context(site: &str, url: &Url, fetched_at: DateTime<Utc>) -> Self {
        let mut record = Self::new();
        record.insert("site", site);
        record.insert("url", url.as_str());
        record.insert("fetched_at", fetched_at.to_rfc3339());
        record
    }

    /// Sets a field, replacing any previous value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Looks up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Looks up a field and renders it as text
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(FieldValue::as_text)
    }

    /// Iterates over fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Iterates over field names in sort order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true when the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut record = Record::new();
        record.insert("title", "A Title");

        assert_eq!(
            record.get("title"),
            Some(&FieldValue::Text("A Title".to_string()))
        );
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn test_with_context_sets_implicit_fields() {
        let url = Url::parse("https://example.com/page/1").unwrap();
        let record = Record::with_context("shop", &url, Utc::now());

        assert_eq!(record.text("site").as_deref(), Some("shop"));
        assert_eq!(
            record.text("url").as_deref(),
            Some("https://example.com/page/1")
        );
        assert!(record.get("fetched_at").is_some());
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_insert_replaces() {
        let mut record = Record::new();
        record.insert("k", "first");
        record.insert("k", "second");

        assert_eq!(record.text("k").as_deref(), Some("second"));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut record = Record::new();
        record.insert("title", "T");
        record.insert("tags", vec!["a".to_string(), "b".to_string()]);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "tags": ["a", "b"], "title": "T" }));
    }

    #[test]
    fn test_field_names_sorted() {
        let mut record = Record::new();
        record.insert("zeta", "1");
        record.insert("alpha", "2");

        let names: Vec<&str> = record.field_names().collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
