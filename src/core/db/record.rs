/// Record Module
///
/// A `Record` is one result row as column-name → value pairs, kept in
/// column order.

use crate::core::db::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Ordered column-name → value mapping for a single row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record { entries: Vec::new() }
    }

    /// Builds a record by pairing column names with row values.
    ///
    /// Pairing stops at the shorter of the two. A repeated column name keeps
    /// the position of its first occurrence and the value of its last.
    pub fn from_row(columns: &[String], row: Vec<Value>) -> Self {
        let mut record = Record {
            entries: Vec::with_capacity(columns.len()),
        };
        for (column, value) in columns.iter().zip(row) {
            record.insert(column.clone(), value);
        }
        record
    }

    /// Inserts a value, replacing (in place) any value under the same name.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.entries.into_iter().map(|(_, value)| value).collect()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}
