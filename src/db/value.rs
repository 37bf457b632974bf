//! Value and row model.
//!
//! The underlying driver returns loosely-typed tuples zipped with column
//! names. They are decoded exactly once, at the driver boundary, into
//! [`DbValue`] / [`Row`]; pool and scope code never inspects row shape.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single database value, used both for bind parameters and for decoded
/// result columns.
///
/// Variant order matters for untagged deserialization: date-shaped strings
/// must be tried before plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    /// NULL value
    Null,
    /// Integer value (stored as i64 for maximum range)
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Date/time value
    DateTime(NaiveDateTime),
    /// Text value
    Text(String),
}

impl DbValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the integer content, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the float content; integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get the text content, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Get the date/time content, if this is a date/time.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::DateTime(_) => "datetime",
            Self::Text(_) => "text",
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// One result row: an ordered mapping from column name to value.
///
/// Column order matches the statement's select list. Serializes as a JSON
/// object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, DbValue)>,
}

impl Row {
    /// Create a row from ordered column/value pairs.
    pub fn new(columns: Vec<(String, DbValue)>) -> Self {
        Self { columns }
    }

    /// Look up a value by column name.
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// Look up a value by position in the select list.
    pub fn get_index(&self, index: usize) -> Option<&DbValue> {
        self.columns.get(index).map(|(_, value)| value)
    }

    /// Column names in select-list order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(col, _)| col.as_str()).collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over column/value pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.columns.iter().map(|(col, value)| (col.as_str(), value))
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (col, value) in &self.columns {
            map.serialize_entry(col, value)?;
        }
        map.end()
    }
}
