use std::io::Write;

use clap::Args;
use gsheets_adapter::schema::Column;
use gsheets_adapter::{
    Adapter, Filter, Predicate, RequestedOrder, Row, RowId, ScanRequest, Value,
};
use gsheets_error::{DbError, Result};
use tracing::info;

/// Filters given on the command line, each as 'column=value'.
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Column equal to value.
    #[clap(long)]
    pub eq: Vec<String>,
    /// Column greater than value.
    #[clap(long)]
    pub gt: Vec<String>,
    /// Column greater than or equal to value.
    #[clap(long)]
    pub ge: Vec<String>,
    /// Column less than value.
    #[clap(long)]
    pub lt: Vec<String>,
    /// Column less than or equal to value.
    #[clap(long)]
    pub le: Vec<String>,
}

impl FilterArgs {
    pub fn scan_request<A: Adapter>(
        &self,
        adapter: &A,
        order: &[String],
        desc: bool,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<ScanRequest> {
        let columns = adapter.columns();
        let mut predicates = Vec::new();

        let ops: [(&[String], fn(Value) -> Filter); 5] = [
            (&self.eq, Filter::Equal),
            (&self.gt, Filter::greater_than),
            (&self.ge, Filter::greater_than_or_equal),
            (&self.lt, Filter::less_than),
            (&self.le, Filter::less_than_or_equal),
        ];
        for (args, make_filter) in ops {
            for arg in args {
                let (column, text) = split_assignment(arg)?;
                let value = parse_value(columns, column, text)?.ok_or_else(|| {
                    DbError::new("Filter value cannot be empty").with_field("filter", arg)
                })?;
                predicates.push(Predicate::new(column, make_filter(value)));
            }
        }

        let order = order
            .iter()
            .map(|col| {
                if desc {
                    RequestedOrder::desc(col.as_str())
                } else {
                    RequestedOrder::asc(col.as_str())
                }
            })
            .collect();

        Ok(ScanRequest {
            predicates,
            order,
            limit,
            offset,
        })
    }
}

fn split_assignment(arg: &str) -> Result<(&str, &str)> {
    arg.split_once('=')
        .map(|(col, val)| (col.trim(), val))
        .ok_or_else(|| DbError::new("Expected 'column=value'").with_field("argument", arg))
}

/// Parse text into a value for a column, using the column's type.
///
/// Empty text is null.
fn parse_value(columns: &[Column], label: &str, text: &str) -> Result<Option<Value>> {
    let column = columns
        .iter()
        .find(|col| col.label == label)
        .ok_or_else(|| DbError::new("Unknown column").with_field("column", label))?;
    if text.is_empty() {
        return Ok(None);
    }
    column
        .field
        .parse(&serde_json::Value::String(text.to_string()))
}

fn row_to_json(row: &Row) -> serde_json::Value {
    let mut obj = serde_json::Map::with_capacity(row.values.len() + 1);
    obj.insert("rowid".to_string(), serde_json::json!(row.rowid));
    for (label, value) in &row.values {
        let value = match value {
            Some(value) => value.to_json(),
            None => serde_json::Value::Null,
        };
        obj.insert(label.clone(), value);
    }
    serde_json::Value::Object(obj)
}

pub fn describe<A: Adapter>(adapter: &A, out: &mut impl Write) -> Result<()> {
    for col in adapter.columns() {
        writeln!(out, "{}\t{}\t{}", col.label, col.provider_id, col.field.type_name())?;
    }
    Ok(())
}

pub async fn scan<A: Adapter>(
    adapter: &mut A,
    request: ScanRequest,
    out: &mut impl Write,
) -> Result<()> {
    for row in adapter.get_data(request).await? {
        writeln!(out, "{}", row_to_json(&row))?;
    }
    Ok(())
}

pub async fn append<A: Adapter>(
    adapter: &mut A,
    assignments: &[String],
    out: &mut impl Write,
) -> Result<()> {
    let mut row = Row::new(None);
    for arg in assignments {
        let (column, text) = split_assignment(arg)?;
        let value = parse_value(adapter.columns(), column, text)?;
        row = row.with_value(column, value);
    }

    let id = adapter.insert_data(row).await?;
    writeln!(out, "inserted row {id}")?;
    Ok(())
}

pub async fn delete<A: Adapter>(
    adapter: &mut A,
    request: ScanRequest,
    out: &mut impl Write,
) -> Result<()> {
    let ids: Vec<RowId> = adapter
        .get_data(request)
        .await?
        .filter_map(|row| row.rowid)
        .collect();

    for id in &ids {
        adapter.delete_data(*id).await?;
    }
    info!(count = ids.len(), "deleted rows");
    writeln!(out, "deleted {} rows", ids.len())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use gsheets_adapter::{AdapterOptions, GSheetsAdapter};
    use gsheets_http::stub::{StubHttpClient, StubResponse};
    use gsheets_http::{Method, StatusCode};
    use serde_json::json;

    use super::*;

    const URL: &str = "https://docs.google.com/spreadsheets/d/ID/edit";

    fn gviz(rows: serde_json::Value) -> StubResponse {
        let body = json!({
            "status": "ok",
            "table": {
                "cols": [
                    {"id": "A", "label": "country", "type": "string"},
                    {"id": "B", "label": "cnt", "type": "number"},
                ],
                "rows": rows,
            },
        });
        StubResponse::new(StatusCode::OK, body.to_string())
    }

    async fn adapter(client: &StubHttpClient) -> GSheetsAdapter<StubHttpClient> {
        GSheetsAdapter::try_new(client.clone(), URL, AdapterOptions::default())
            .await
            .unwrap()
    }

    #[test]
    fn assignments() {
        assert_eq!(("cnt", "1"), split_assignment("cnt=1").unwrap());
        assert_eq!(("a", "b=c"), split_assignment("a=b=c").unwrap());
        assert!(split_assignment("cnt").is_err());
    }

    #[tokio::test]
    async fn filters_typed_by_column() {
        let client = StubHttpClient::new();
        client.respond(Method::GET, "/gviz/tq", gviz(json!([])));
        let adapter = adapter(&client).await;

        let args = FilterArgs {
            eq: vec!["country=BR".to_string()],
            gt: vec!["cnt=2.5".to_string()],
            ..Default::default()
        };
        let request = args
            .scan_request(&adapter, &["cnt".to_string()], true, Some(3), None)
            .unwrap();

        assert_eq!(
            vec![
                Predicate::new("country", Filter::Equal(Value::String("BR".to_string()))),
                Predicate::new("cnt", Filter::greater_than(Value::Float(2.5))),
            ],
            request.predicates
        );
        assert_eq!(vec![RequestedOrder::desc("cnt")], request.order);
        assert_eq!(Some(3), request.limit);
    }

    #[tokio::test]
    async fn invalid_filter_value() {
        let client = StubHttpClient::new();
        client.respond(Method::GET, "/gviz/tq", gviz(json!([])));
        let adapter = adapter(&client).await;

        let args = FilterArgs {
            lt: vec!["cnt=many".to_string()],
            ..Default::default()
        };
        assert!(args.scan_request(&adapter, &[], false, None, None).is_err());
    }

    #[tokio::test]
    async fn scan_prints_json_lines() {
        let client = StubHttpClient::new();
        client.respond(Method::GET, "/gviz/tq", gviz(json!([])));
        client.respond(
            Method::GET,
            "/gviz/tq",
            gviz(json!([
                {"c": [{"v": "BR"}, {"v": 10.0}]},
                {"c": [{"v": "US"}, null]},
            ])),
        );
        let mut adapter = adapter(&client).await;

        let mut out = Vec::new();
        scan(&mut adapter, ScanRequest::default(), &mut out)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            vec![
                json!({"rowid": 0, "country": "BR", "cnt": 10.0}),
                json!({"rowid": 1, "country": "US", "cnt": null}),
            ],
            lines
        );
    }

    #[tokio::test]
    async fn describe_columns() {
        let client = StubHttpClient::new();
        client.respond(Method::GET, "/gviz/tq", gviz(json!([])));
        let adapter = adapter(&client).await;

        let mut out = Vec::new();
        describe(&adapter, &mut out).unwrap();
        assert_eq!(
            "country\tA\tstring\ncnt\tB\tnumber\n",
            String::from_utf8(out).unwrap()
        );
    }
}
