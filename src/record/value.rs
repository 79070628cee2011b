use serde::Serialize;

/// Value of a single record field
///
/// Selector extraction yields `Text` when exactly one element matched and
/// `List` when several did. Link and image extraction always yield lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A single extracted string
    Text(String),

    /// Several extracted strings, in document order
    List(Vec<String>),
}

impl FieldValue {
    /// Renders the value as a single string
    ///
    /// Lists are joined with `", "`. This is the form used for filter
    /// comparisons, deduplication keys, sort keys, and tabular output.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
        }
    }

    /// Returns true for an empty string or an empty list
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}
