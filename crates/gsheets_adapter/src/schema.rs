use chrono_tz::Tz;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::field::TypedField;
use crate::gviz::QueryTable;

/// Query used to discover the columns of a sheet.
pub const PROBE_QUERY: &str = "SELECT * LIMIT 1";

/// A column exposed to the host engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Trimmed, non-empty, unique label.
    pub label: String,
    /// Identifier used to reference the column in queries (e.g. "A").
    pub provider_id: String,
    pub field: TypedField,
    /// Zero based physical position of the column in the sheet.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Columns with labels, in sheet order.
    pub columns: Vec<Column>,
    /// Label to provider identifier for every returned column, including
    /// those without a label.
    pub column_map: IndexMap<String, String>,
    /// Number of leading rows holding headers that the query endpoint
    /// doesn't know about.
    pub header_rows: u64,
}

impl Schema {
    /// Derive the schema from the result of the probe query.
    pub fn resolve(table: &QueryTable, timezone: Option<Tz>) -> Self {
        let mut labels: Vec<String> = table.cols.iter().map(|col| col.label.clone()).collect();
        let mut header_rows = 0;

        // Without labels, the first row holds the headers. If there's no data
        // at all, fall back to column identifiers.
        if labels.iter().all(|label| label.is_empty()) {
            match table.rows.first() {
                Some(row) => {
                    header_rows = 1;
                    for (idx, label) in labels.iter_mut().enumerate() {
                        *label = match row.value(idx) {
                            Some(serde_json::Value::String(s)) => s.clone(),
                            Some(v) => v.to_string(),
                            None => String::new(),
                        };
                    }
                }
                None => {
                    for (label, col) in labels.iter_mut().zip(&table.cols) {
                        *label = col.id.clone();
                    }
                }
            }
        }

        let mut column_map = IndexMap::with_capacity(table.cols.len());
        let mut columns = Vec::with_capacity(table.cols.len());

        for (idx, (col, label)) in table.cols.iter().zip(labels).enumerate() {
            let label = label.trim().to_string();
            if label.is_empty() {
                column_map.entry(label).or_insert_with(|| col.id.clone());
                continue;
            }
            if column_map.contains_key(&label) {
                warn!(%label, id = %col.id, "ignoring column with duplicate label");
                continue;
            }
            column_map.insert(label.clone(), col.id.clone());

            columns.push(Column {
                label,
                provider_id: col.id.clone(),
                field: TypedField::from_provider_type(&col.type_name, timezone),
                position: column_position(&col.id).unwrap_or(idx),
            });
        }

        debug!(num_columns = columns.len(), header_rows, "resolved sheet schema");

        Schema {
            columns,
            column_map,
            header_rows,
        }
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.label == label)
    }
}

/// Zero based position of a column from its letters, "A" is 0, "AA" is 26.
///
/// Returns None for anything that isn't a column letter sequence, or that
/// doesn't fit in a usize.
pub fn column_position(id: &str) -> Option<usize> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    let pos = id.bytes().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add(usize::from(b - b'A' + 1))
    })?;
    Some(pos - 1)
}
