//! Helpers for the spreadsheets REST api.

use gsheets_error::{DbError, Result, ResultExt};
use url::Url;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Build an api url from path segments, encoding each segment.
pub fn api_url(segments: &[&str], params: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(SHEETS_API_BASE).context("Failed to parse api base url")?;
    url.path_segments_mut()
        .map_err(|_| DbError::new("Api base url cannot have path segments"))?
        .extend(segments);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// Return an error if the payload holds an api error.
///
/// The provider's message is used as is.
pub fn check_api_error(payload: &serde_json::Value) -> Result<()> {
    match payload.get("error") {
        Some(error) => {
            let msg = match error.get("message").and_then(|m| m.as_str()) {
                Some(msg) => msg.to_string(),
                None => error.to_string(),
            };
            Err(DbError::new(msg))
        }
        None => Ok(()),
    }
}

/// Quote a sheet name for use in A1 notation.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// A1 range for a whole row, with `row_number` being zero based.
pub fn row_range(sheet: &str, row_number: usize) -> String {
    format!("{}!A{}", quote_sheet_name(sheet), row_number + 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn url_segments_encoded() {
        let url = api_url(
            &["abc", "values", "'My Sheet':append"],
            &[("valueInputOption", "USER_ENTERED")],
        )
        .unwrap();
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values/'My%20Sheet':append?valueInputOption=USER_ENTERED",
            url.as_str()
        );
    }

    #[test]
    fn api_error_message() {
        let payload = json!({"error": {"code": 400, "message": "Unable to parse range", "status": "INVALID_ARGUMENT"}});
        let err = check_api_error(&payload).unwrap_err();
        assert_eq!("Unable to parse range", err.get_msg());
        assert!(check_api_error(&json!({"spreadsheetId": "abc"})).is_ok());
    }

    #[test]
    fn ranges() {
        assert_eq!("'Sheet1'!A3", row_range("Sheet1", 2));
        assert_eq!("'Bob''s'!A1", row_range("Bob's", 0));
    }
}
