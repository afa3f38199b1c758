//! Sql adapter for spreadsheets.
//!
//! A spreadsheet is exposed as a table: the schema is derived from the
//! sheet's header row, pushed down filters are translated into queries for
//! the visualization endpoint, and rows can be inserted, updated and deleted
//! through the spreadsheets api.

pub mod adapter;
pub mod api;
pub mod field;
pub mod filter;
pub mod gviz;
pub mod identity;
pub mod metadata;
pub mod options;
pub mod query;
pub mod schema;
pub mod url;

pub use adapter::{Adapter, GSheetsAdapter};
pub use field::{TypedField, Value};
pub use filter::{Filter, Predicate, RequestedOrder, ScanRequest, SortDirection};
pub use identity::{Row, RowId};
pub use options::AdapterOptions;
pub use url::supports;
