//! Translation of pushed down filters and ordering into the query language
//! of the visualization endpoint.

use std::fmt::Write as _;

use gsheets_error::{DbError, Result};
use indexmap::IndexMap;

use crate::field::Order;
use crate::filter::{Filter, ScanRequest, SortDirection};
use crate::schema::Column;

/// Result of translating a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Query to send to the provider.
    Filtered(String),
    /// The filters can never match, no query needs to be sent.
    NoMatch,
}

fn find_column<'a>(columns: &'a [Column], label: &str) -> Result<&'a Column> {
    columns
        .iter()
        .find(|col| col.label == label)
        .ok_or_else(|| DbError::new("Unknown column").with_field("column", label))
}

/// Build the query for a scan.
///
/// Columns are referenced by their provider identifiers. `header_rows` rows
/// are skipped in addition to any requested offset.
pub fn build_query(columns: &[Column], request: &ScanRequest, header_rows: u64) -> Result<QueryPlan> {
    // Combine all filters on the same column first so contradictions are
    // found before anything is sent.
    let mut filters: IndexMap<&str, Filter> = IndexMap::new();
    for pred in &request.predicates {
        match filters.get_mut(pred.column.as_str()) {
            Some(existing) => {
                let prev = std::mem::replace(existing, Filter::Impossible);
                *existing = prev.combine(pred.filter.clone())?;
            }
            None => {
                filters.insert(pred.column.as_str(), pred.filter.clone());
            }
        }
    }

    let mut conditions = Vec::with_capacity(filters.len());
    for (label, filter) in filters {
        let column = find_column(columns, label)?;
        let id = &column.provider_id;
        let field = &column.field;

        let kind = match filter.kind() {
            Some(kind) => kind,
            None => return Ok(QueryPlan::NoMatch),
        };
        if !field.supports_filter(kind) {
            return Err(DbError::new("Filter not supported for column")
                .with_field("column", label)
                .with_field("type", field.type_name()));
        }

        match filter {
            Filter::Equal(value) => conditions.push(format!("{id} = {}", field.quote(&value)?)),
            Filter::Range {
                start,
                end,
                include_start,
                include_end,
            } => {
                if let Some(start) = start {
                    let op = if include_start { ">=" } else { ">" };
                    conditions.push(format!("{id} {op} {}", field.quote(&start)?));
                }
                if let Some(end) = end {
                    let op = if include_end { "<=" } else { "<" };
                    conditions.push(format!("{id} {op} {}", field.quote(&end)?));
                }
            }
            Filter::Impossible => return Ok(QueryPlan::NoMatch),
        }
    }

    let mut query = String::from("SELECT ");
    if columns.is_empty() {
        query.push('*');
    } else {
        let ids: Vec<_> = columns.iter().map(|col| col.provider_id.as_str()).collect();
        query.push_str(&ids.join(", "));
    }

    if !conditions.is_empty() {
        write!(query, " WHERE {}", conditions.join(" AND "))?;
    }

    if !request.order.is_empty() {
        let mut order_by = Vec::with_capacity(request.order.len());
        for order in &request.order {
            let column = find_column(columns, &order.column)?;
            if column.field.order() == Order::None {
                return Err(DbError::new("Column cannot be ordered")
                    .with_field("column", &order.column));
            }
            match order.direction {
                SortDirection::Ascending => order_by.push(column.provider_id.clone()),
                SortDirection::Descending => order_by.push(format!("{} desc", column.provider_id)),
            }
        }
        write!(query, " ORDER BY {}", order_by.join(", "))?;
    }

    if let Some(limit) = request.limit {
        write!(query, " LIMIT {limit}")?;
    }

    let offset = header_rows + request.offset.unwrap_or(0);
    if offset > 0 {
        write!(query, " OFFSET {offset}")?;
    }

    Ok(QueryPlan::Filtered(query))
}
