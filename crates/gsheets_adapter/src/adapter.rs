use gsheets_error::{DbError, OptionExt, Result};
use gsheets_http::client::HttpClient;
use gsheets_http::google::session::AuthorizedSession;
use gsheets_http::{HeaderName, HeaderValue};
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::api::{api_url, check_api_error, quote_sheet_name, row_range};
use crate::field::Value;
use crate::filter::ScanRequest;
use crate::gviz::{QueryTable, decode_query_response};
use crate::identity::{Row, RowId, RowIdentityMap, RowIter, RowValues};
use crate::metadata::SheetAddress;
use crate::options::AdapterOptions;
use crate::query::{QueryPlan, build_query};
use crate::schema::{Column, PROBE_QUERY, Schema};
use crate::url::SheetUrl;

/// Storage backend as seen by the host query engine.
///
/// The host parses sql and hands down the filters and ordering it extracted.
/// Rows are addressed by synthetic identifiers handed out when reading.
pub trait Adapter {
    type Rows<'a>: Iterator<Item = Row> + 'a
    where
        Self: 'a;

    /// Columns of the table, in physical order.
    fn columns(&self) -> &[Column];

    /// Scan rows matching the request.
    fn get_data(
        &mut self,
        request: ScanRequest,
    ) -> impl Future<Output = Result<Self::Rows<'_>>> + Send;

    /// Insert a row, returning its identifier.
    fn insert_data(&mut self, row: Row) -> impl Future<Output = Result<RowId>> + Send;

    fn delete_data(&mut self, row_id: RowId) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite a row. If `row` carries a different identifier, the row is
    /// known by that identifier afterwards.
    fn update_data(&mut self, row_id: RowId, row: Row)
    -> impl Future<Output = Result<()>> + Send;
}

/// Adapter for a single sheet in a spreadsheet.
///
/// Operations take `&mut self`, so at most one is in flight per adapter.
#[derive(Debug)]
pub struct GSheetsAdapter<C: HttpClient> {
    session: AuthorizedSession<C>,
    url: SheetUrl,
    address: SheetAddress,
    schema: Schema,
    identity: RowIdentityMap,
}

impl<C> GSheetsAdapter<C>
where
    C: HttpClient,
{
    /// Connect to the sheet at `uri`, resolving its address and schema.
    pub async fn try_new(client: C, uri: &str, options: AdapterOptions) -> Result<Self> {
        let url = SheetUrl::parse(uri)?;
        let session = AuthorizedSession::new(client, options.credentials()?);
        let address = SheetAddress::resolve(&session, &url).await?;

        let table = run_query(&session, &url, PROBE_QUERY).await?;
        let schema = Schema::resolve(&table, address.timezone);

        Ok(GSheetsAdapter {
            session,
            url,
            address,
            schema,
            identity: RowIdentityMap::new(),
        })
    }

    pub fn address(&self) -> &SheetAddress {
        &self.address
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn url(&self) -> &SheetUrl {
        &self.url
    }

    pub fn identity(&self) -> &RowIdentityMap {
        &self.identity
    }

    fn sheet_name(&self) -> Result<&str> {
        self.address.sheet_name.as_deref().ok_or_else(|| {
            DbError::new("Could not determine sheet name, modifying a sheet requires credentials")
                .with_field("spreadsheet_id", &self.address.spreadsheet_id)
        })
    }

    fn parse_rows(&self, table: &QueryTable) -> Result<Vec<RowValues>> {
        table
            .rows
            .iter()
            .map(|row| {
                self.schema
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| match row.value(idx) {
                        Some(raw) => col.field.parse(raw),
                        None => Ok(None),
                    })
                    .collect::<Result<RowValues>>()
            })
            .collect()
    }

    /// Values of a row as the sheet holds them once written.
    fn written_values(&self, row: &Row) -> Result<RowValues> {
        let values = row.to_values(&self.schema.columns)?;
        Ok(self
            .schema
            .columns
            .iter()
            .zip(values)
            .map(|(col, value)| value.map(|value| col.field.as_written(value)))
            .collect())
    }

    /// Lay out values by physical column position.
    ///
    /// Positions without a column in the schema are sent as null, which the
    /// api leaves untouched.
    fn positional_values(&self, values: &[Option<Value>]) -> Result<Vec<JsonValue>> {
        let width = self
            .schema
            .columns
            .iter()
            .map(|col| col.position + 1)
            .max()
            .unwrap_or(0);
        let mut out = vec![JsonValue::Null; width];
        for (col, value) in self.schema.columns.iter().zip(values) {
            out[col.position] = col.field.format(value.as_ref())?;
        }
        Ok(out)
    }

    /// Find the zero based row number of a row by its last known values.
    ///
    /// The first row where every column matches wins.
    async fn find_row_number(&self, row_id: RowId, values: &RowValues) -> Result<usize> {
        let range = quote_sheet_name(self.sheet_name()?);
        let url = api_url(
            &[self.address.spreadsheet_id.as_str(), "values", range.as_str()],
            &[
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "SERIAL_NUMBER"),
            ],
        )?;

        let payload = self.session.get(url, &[]).await?.json()?;
        check_api_error(&payload)?;

        let rows = match payload.get("values").and_then(|v| v.as_array()) {
            Some(rows) => rows.as_slice(),
            None => &[],
        };

        for (row_number, row) in rows.iter().enumerate() {
            let cells = match row.as_array() {
                Some(cells) => cells,
                None => continue,
            };
            let matches = self
                .schema
                .columns
                .iter()
                .zip(values)
                .all(|(col, expected)| {
                    col.field
                        .matches_unformatted(expected.as_ref(), cells.get(col.position))
                });
            if matches {
                debug!(row_id, row_number, "located row");
                return Ok(row_number);
            }
        }

        Err(DbError::new("Could not find row").with_field("row_id", row_id))
    }
}

/// Send a query to the query endpoint.
async fn run_query<C>(
    session: &AuthorizedSession<C>,
    url: &SheetUrl,
    query: &str,
) -> Result<QueryTable>
where
    C: HttpClient,
{
    debug!(%query, "running sheet query");

    let header = (
        HeaderName::from_static("x-datasource-auth"),
        HeaderValue::from_static("true"),
    );
    let resp = session.get(url.query_url(query)?, &[header]).await?;
    let response = decode_query_response(resp.status, &resp.text)?;
    response.table.required("table")
}

impl<C> Adapter for GSheetsAdapter<C>
where
    C: HttpClient,
{
    type Rows<'a>
        = RowIter<'a>
    where
        Self: 'a;

    fn columns(&self) -> &[Column] {
        &self.schema.columns
    }

    async fn get_data(&mut self, request: ScanRequest) -> Result<Self::Rows<'_>> {
        let plan = build_query(&self.schema.columns, &request, self.schema.header_rows)?;
        let rows = match plan {
            QueryPlan::NoMatch => {
                debug!("filters can't match any rows, skipping query");
                Vec::new()
            }
            QueryPlan::Filtered(query) => {
                let table = run_query(&self.session, &self.url, &query).await?;
                self.parse_rows(&table)?
            }
        };

        Ok(RowIter::new(
            &mut self.identity,
            &self.schema.columns,
            rows,
        ))
    }

    async fn insert_data(&mut self, row: Row) -> Result<RowId> {
        let values = self.written_values(&row)?;
        let sheet = self.sheet_name()?.to_string();
        let row_id = row.rowid.unwrap_or_else(|| self.identity.next_id());

        // Kept even if the request below fails.
        self.identity.insert(row_id, values.clone());

        let range = quote_sheet_name(&sheet);
        let segment = format!("{range}:append");
        let url = api_url(
            &[self.address.spreadsheet_id.as_str(), "values", segment.as_str()],
            &[("valueInputOption", "USER_ENTERED")],
        )?;
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [self.positional_values(&values)?],
        });

        debug!(row_id, %sheet, "appending row");
        let payload = self.session.post_json(url, &body).await?.json()?;
        check_api_error(&payload)?;

        Ok(row_id)
    }

    async fn delete_data(&mut self, row_id: RowId) -> Result<()> {
        let current = self
            .identity
            .get(row_id)
            .cloned()
            .ok_or_else(|| DbError::new("Invalid row to delete").with_field("row_id", row_id))?;

        let row_number = self.find_row_number(row_id, &current).await?;

        let segment = format!("{}:batchUpdate", self.address.spreadsheet_id);
        let url = api_url(&[segment.as_str()], &[])?;
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": self.address.sheet_id,
                        "dimension": "ROWS",
                        "startIndex": row_number,
                        "endIndex": row_number + 1,
                    }
                }
            }]
        });

        debug!(row_id, row_number, "deleting row");
        let payload = self.session.post_json(url, &body).await?.json()?;
        check_api_error(&payload)?;

        self.identity.remove(row_id);

        Ok(())
    }

    async fn update_data(&mut self, row_id: RowId, row: Row) -> Result<()> {
        let current = self
            .identity
            .get(row_id)
            .cloned()
            .ok_or_else(|| DbError::new("Invalid row to update").with_field("row_id", row_id))?;
        let values = self.written_values(&row)?;

        let row_number = self.find_row_number(row_id, &current).await?;
        let range = row_range(self.sheet_name()?, row_number);

        let url = api_url(
            &[self.address.spreadsheet_id.as_str(), "values", range.as_str()],
            &[("valueInputOption", "USER_ENTERED")],
        )?;
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [self.positional_values(&values)?],
        });

        debug!(row_id, row_number, "updating row");
        let payload = self.session.put_json(url, &body).await?.json()?;
        check_api_error(&payload)?;

        let new_id = row.rowid.unwrap_or(row_id);
        self.identity.replace(row_id, new_id, values);

        Ok(())
    }
}
