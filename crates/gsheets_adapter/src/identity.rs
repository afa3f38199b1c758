use std::collections::BTreeMap;

use gsheets_error::{DbError, Result};
use indexmap::IndexMap;

use crate::field::Value;
use crate::schema::Column;

/// Synthetic identifier for a row, local to an adapter instance.
pub type RowId = i64;

/// Values of a row in schema order.
pub type RowValues = Vec<Option<Value>>;

/// A row as exchanged with the host engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub rowid: Option<RowId>,
    /// Values keyed by column label. Missing labels are treated as null.
    pub values: IndexMap<String, Option<Value>>,
}

impl Row {
    pub fn new(rowid: Option<RowId>) -> Self {
        Row {
            rowid,
            values: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, label: impl Into<String>, value: Option<Value>) -> Self {
        self.values.insert(label.into(), value);
        self
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.values.get(label).and_then(|v| v.as_ref())
    }

    /// Build a row from values in schema order.
    pub fn from_values(rowid: Option<RowId>, columns: &[Column], values: RowValues) -> Self {
        Row {
            rowid,
            values: columns
                .iter()
                .map(|col| col.label.clone())
                .zip(values)
                .collect(),
        }
    }

    /// Get the values of this row in schema order.
    ///
    /// Errors if the row contains a label not in the schema.
    pub fn to_values(&self, columns: &[Column]) -> Result<RowValues> {
        if let Some(unknown) = self
            .values
            .keys()
            .find(|label| !columns.iter().any(|col| &col.label == *label))
        {
            return Err(DbError::new("Unknown column").with_field("column", unknown));
        }

        Ok(columns
            .iter()
            .map(|col| self.values.get(&col.label).cloned().flatten())
            .collect())
    }
}

/// Last known values for every row handed out or written by an adapter.
///
/// The provider has no row keys, so these values are what's used to find a
/// row again before mutating it.
#[derive(Debug, Default)]
pub struct RowIdentityMap {
    rows: BTreeMap<RowId, RowValues>,
}

impl RowIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RowId) -> Option<&RowValues> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: RowId) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn insert(&mut self, id: RowId, values: RowValues) {
        self.rows.insert(id, values);
    }

    pub fn remove(&mut self, id: RowId) -> Option<RowValues> {
        self.rows.remove(&id)
    }

    /// Identifier to use for a row inserted without one.
    pub fn next_id(&self) -> RowId {
        match self.rows.last_key_value() {
            Some((id, _)) => id + 1,
            None => 0,
        }
    }

    /// Replace the values for `old`, moving them to `new` if the identifier
    /// changed.
    pub fn replace(&mut self, old: RowId, new: RowId, values: RowValues) {
        if old != new {
            self.rows.remove(&old);
        }
        self.rows.insert(new, values);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rows produced by a scan.
///
/// Each row is registered in the identity map as it's yielded, with ids
/// counting up from zero for every scan.
#[derive(Debug)]
pub struct RowIter<'a> {
    identity: &'a mut RowIdentityMap,
    columns: &'a [Column],
    rows: std::vec::IntoIter<RowValues>,
    next_id: RowId,
}

impl<'a> RowIter<'a> {
    pub fn new(
        identity: &'a mut RowIdentityMap,
        columns: &'a [Column],
        rows: Vec<RowValues>,
    ) -> Self {
        RowIter {
            identity,
            columns,
            rows: rows.into_iter(),
            next_id: 0,
        }
    }
}

impl Iterator for RowIter<'_> {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.rows.next()?;
        let id = self.next_id;
        self.next_id += 1;

        self.identity.insert(id, values.clone());
        Some(Row::from_values(Some(id), self.columns, values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TypedField;

    fn columns() -> Vec<Column> {
        vec![
            Column {
                label: "name".to_string(),
                provider_id: "A".to_string(),
                field: TypedField::String,
                position: 0,
            },
            Column {
                label: "score".to_string(),
                provider_id: "B".to_string(),
                field: TypedField::Float,
                position: 1,
            },
        ]
    }

    fn s(v: &str) -> Option<Value> {
        Some(Value::String(v.to_string()))
    }

    #[test]
    fn next_id_after_max() {
        let mut map = RowIdentityMap::new();
        assert_eq!(0, map.next_id());
        map.insert(0, vec![]);
        map.insert(5, vec![]);
        map.insert(2, vec![]);
        assert_eq!(6, map.next_id());
    }

    #[test]
    fn replace_moves_key() {
        let mut map = RowIdentityMap::new();
        map.insert(1, vec![s("a")]);
        map.replace(1, 4, vec![s("b")]);
        assert!(!map.contains(1));
        assert_eq!(Some(&vec![s("b")]), map.get(4));

        map.replace(4, 4, vec![s("c")]);
        assert_eq!(1, map.len());
        assert_eq!(Some(&vec![s("c")]), map.get(4));
    }

    #[test]
    fn iter_registers_rows_lazily() {
        let cols = columns();
        let mut map = RowIdentityMap::new();
        let rows = vec![
            vec![s("a"), Some(Value::Float(1.0))],
            vec![s("b"), None],
        ];

        let mut iter = RowIter::new(&mut map, &cols, rows);
        let first = iter.next().unwrap();
        assert_eq!(Some(0), first.rowid);
        assert_eq!(Some(&Value::Float(1.0)), first.get("score"));
        drop(iter);

        // Only the consumed row was registered.
        assert_eq!(1, map.len());
        assert_eq!(Some(&vec![s("a"), Some(Value::Float(1.0))]), map.get(0));
    }

    #[test]
    fn to_values_fills_missing_with_null() {
        let row = Row::new(None).with_value("score", Some(Value::Float(2.0)));
        let values = row.to_values(&columns()).unwrap();
        assert_eq!(vec![None, Some(Value::Float(2.0))], values);
    }

    #[test]
    fn to_values_unknown_label() {
        let row = Row::new(None).with_value("missing", None);
        let err = row.to_values(&columns()).unwrap_err();
        assert_eq!(Some("missing"), err.get_field("column"));
    }
}
