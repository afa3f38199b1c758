//! Resolution of human facing spreadsheet urls.

use gsheets_error::{DbError, Result, ResultExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

/// Characters left as is when encoding the query text.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/')
    .remove(b'(')
    .remove(b')');

const QUERY_ENDPOINT_PATH: &str = "gviz/tq";

/// Check if a uri points to a spreadsheet.
pub fn supports(uri: &str) -> bool {
    match Url::parse(uri) {
        Ok(url) => {
            url.host_str() == Some("docs.google.com") && url.path().starts_with("/spreadsheets/")
        }
        Err(_) => false,
    }
}

/// A spreadsheet url along with the addressing parameters found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetUrl {
    pub spreadsheet_id: String,
    /// Numeric sheet id, 0 for the first sheet.
    pub gid: i64,
    /// Sheet name, takes precedence over `gid` when querying.
    pub sheet: Option<String>,
    /// Number of header rows to tell the query endpoint about.
    pub headers: i64,
    endpoint: Url,
}

impl SheetUrl {
    /// Parse a spreadsheet url, e.g.
    /// `https://docs.google.com/spreadsheets/d/<id>/edit#gid=0`.
    ///
    /// Query string parameters `headers`, `gid` and `sheet` are read, with a
    /// `#gid=N` fragment overriding any `gid` parameter.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).context("Failed to parse spreadsheet url")?;

        let spreadsheet_id = url
            .path_segments()
            .and_then(|mut segments| segments.nth(2))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DbError::new("Missing spreadsheet id in url").with_field("url", uri))?
            .to_string();

        let mut headers = 0;
        let mut gid = 0;
        let mut sheet = None;

        // Last occurrence wins.
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "headers" => {
                    headers = value
                        .parse()
                        .context_fn(|| format!("Failed to parse headers: {value}"))?
                }
                "gid" => {
                    gid = value
                        .parse()
                        .context_fn(|| format!("Failed to parse gid: {value}"))?
                }
                "sheet" => sheet = Some(value.into_owned()),
                _ => (),
            }
        }

        if let Some(fragment_gid) = url.fragment().and_then(|f| f.strip_prefix("gid=")) {
            gid = fragment_gid
                .parse()
                .context_fn(|| format!("Failed to parse gid: {fragment_gid}"))?;
        }

        let mut endpoint = url.clone();
        let path = url.path();
        let path = path.strip_suffix("/edit").unwrap_or(path);
        endpoint.set_path(&format!("{}/{QUERY_ENDPOINT_PATH}", path.trim_end_matches('/')));
        endpoint.set_fragment(None);
        endpoint.set_query(None);
        {
            let mut pairs = endpoint.query_pairs_mut();
            if headers > 0 {
                pairs.append_pair("headers", &headers.to_string());
            }
            match &sheet {
                Some(sheet) => pairs.append_pair("sheet", sheet),
                None => pairs.append_pair("gid", &gid.to_string()),
            };
        }

        Ok(SheetUrl {
            spreadsheet_id,
            gid,
            sheet,
            headers,
            endpoint,
        })
    }

    /// The query endpoint, without a query.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The query endpoint with `query` attached.
    pub fn query_url(&self, query: &str) -> Result<Url> {
        let encoded = utf8_percent_encode(query, QUERY_ENCODE_SET);
        let url = format!("{}&tq={encoded}", self.endpoint);
        Url::parse(&url).context("Failed to build query url")
    }
}
