//! Payloads returned by the visualization query endpoint.

use gsheets_error::{DbError, Result, ResultExt};
use gsheets_http::StatusCode;
use serde::Deserialize;

/// Prefix the endpoint may put in front of the json body.
pub const JSON_PAYLOAD_PREFIX: &str = ")]}'\n";

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub table: Option<QueryTable>,
    #[serde(default)]
    pub errors: Vec<QueryError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryError {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detailed_message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryTable {
    #[serde(default)]
    pub cols: Vec<QueryColumn>,
    #[serde(default)]
    pub rows: Vec<QueryRow>,
    #[serde(default, rename = "parsedNumHeaders")]
    pub parsed_num_headers: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryColumn {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRow {
    #[serde(default)]
    pub c: Vec<Option<QueryCell>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryCell {
    /// Raw value, null for empty cells.
    #[serde(default)]
    pub v: serde_json::Value,
    /// Formatted value.
    #[serde(default)]
    pub f: Option<String>,
}

impl QueryRow {
    /// Get the raw value of a cell, treating missing cells as null.
    pub fn value(&self, idx: usize) -> Option<&serde_json::Value> {
        self.c
            .get(idx)
            .and_then(|cell| cell.as_ref())
            .map(|cell| &cell.v)
            .filter(|v| !v.is_null())
    }
}

/// Decode a response from the query endpoint.
///
/// Non-200 responses and error payloads become errors carrying the text
/// returned by the provider.
pub fn decode_query_response(status: StatusCode, text: &str) -> Result<QueryResponse> {
    if status != StatusCode::OK {
        return Err(DbError::new(text));
    }

    let response: QueryResponse = match text.strip_prefix(JSON_PAYLOAD_PREFIX) {
        Some(json) => {
            serde_json::from_str(json).context("Failed to deserialize query response")?
        }
        None => serde_json::from_str(text).map_err(|_| {
            DbError::new(
                "Response from Google is not valid JSON. Please verify that you have the proper credentials to access the spreadsheet.",
            )
        })?,
    };

    if response.status == "error" {
        let msg = response
            .errors
            .iter()
            .map(|err| err.detailed_message.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        return Err(DbError::new(msg));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_prefixed() {
        let text = ")]}'\n{\"version\":\"0.6\",\"status\":\"ok\",\"table\":{\"cols\":[{\"id\":\"A\",\"label\":\"country\",\"type\":\"string\"}],\"rows\":[{\"c\":[{\"v\":\"BR\"}]}],\"parsedNumHeaders\":1}}";
        let resp = decode_query_response(StatusCode::OK, text).unwrap();
        let table = resp.table.unwrap();
        assert_eq!("country", table.cols[0].label);
        assert_eq!(1, table.parsed_num_headers);
        assert_eq!(Some(&serde_json::json!("BR")), table.rows[0].value(0));
    }

    #[test]
    fn decode_plain_json() {
        let text = r#"{"status":"ok","table":{"cols":[],"rows":[]}}"#;
        let resp = decode_query_response(StatusCode::OK, text).unwrap();
        assert!(resp.table.unwrap().rows.is_empty());
    }

    #[test]
    fn missing_and_null_cells() {
        let row: QueryRow = serde_json::from_str(r#"{"c":[null,{"v":null},{"v":1.0}]}"#).unwrap();
        assert_eq!(None, row.value(0));
        assert_eq!(None, row.value(1));
        assert_eq!(Some(&serde_json::json!(1.0)), row.value(2));
        assert_eq!(None, row.value(3));
    }

    #[test]
    fn error_messages_joined() {
        let text = r#"{"status":"error","errors":[
            {"reason":"invalid_query","message":"INVALID_QUERY","detailed_message":"Invalid query: NO_COLUMN: C"},
            {"reason":"other","message":"OTHER","detailed_message":"Second problem"}
        ]}"#;
        let err = decode_query_response(StatusCode::OK, text).unwrap_err();
        assert_eq!("Invalid query: NO_COLUMN: C\n\nSecond problem", err.get_msg());
    }

    #[test]
    fn not_json() {
        let err = decode_query_response(StatusCode::OK, "<html></html>").unwrap_err();
        assert!(err.get_msg().starts_with("Response from Google is not valid JSON"));
    }

    #[test]
    fn non_200_passes_text_through() {
        let err = decode_query_response(StatusCode::BAD_REQUEST, "bad request").unwrap_err();
        assert_eq!("bad request", err.get_msg());
    }
}
