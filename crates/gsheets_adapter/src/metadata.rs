use chrono_tz::Tz;
use gsheets_error::{Result, ResultExt};
use gsheets_http::client::HttpClient;
use gsheets_http::google::session::AuthorizedSession;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::{api_url, check_api_error};
use crate::url::SheetUrl;

/// Where a sheet lives, resolved once when the adapter is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetAddress {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    /// Needed for mutations. Only known with an authorized session, or when
    /// given in the url.
    pub sheet_name: Option<String>,
    pub timezone: Option<Tz>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMetadata {
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetProperties {
    #[serde(default)]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SheetMetadata {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

impl SheetAddress {
    /// Resolve the address of the sheet a url points to.
    ///
    /// Anonymous sessions can't read metadata, so only what's in the url is
    /// used.
    pub async fn resolve<C>(session: &AuthorizedSession<C>, url: &SheetUrl) -> Result<Self>
    where
        C: HttpClient,
    {
        let mut address = SheetAddress {
            spreadsheet_id: url.spreadsheet_id.clone(),
            sheet_id: url.gid,
            sheet_name: url.sheet.clone(),
            timezone: None,
        };

        if !session.is_authorized() {
            debug!("skipping metadata for anonymous session");
            return Ok(address);
        }

        let meta_url = api_url(
            &[url.spreadsheet_id.as_str()],
            &[("includeGridData", "false")],
        )?;
        let payload = session.get(meta_url, &[]).await?.json()?;
        check_api_error(&payload)?;
        let metadata: SpreadsheetMetadata =
            serde_json::from_value(payload).context("Failed to deserialize spreadsheet metadata")?;

        match metadata.properties.time_zone.as_deref() {
            Some(tz) => match tz.parse::<Tz>() {
                Ok(tz) => address.timezone = Some(tz),
                Err(_) => warn!(%tz, "Could not determine timezone"),
            },
            None => warn!("Could not determine timezone"),
        }

        let sheet = match &url.sheet {
            Some(name) => metadata.sheets.iter().find(|s| &s.properties.title == name),
            None => metadata
                .sheets
                .iter()
                .find(|s| s.properties.sheet_id == url.gid),
        };

        match sheet {
            Some(sheet) => {
                address.sheet_id = sheet.properties.sheet_id;
                address.sheet_name = Some(sheet.properties.title.clone());
            }
            None => warn!(gid = url.gid, sheet = ?url.sheet, "Could not determine sheet name"),
        }

        debug!(?address, "resolved sheet address");

        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use gsheets_http::Method;
    use gsheets_http::google::session::Credentials;
    use gsheets_http::stub::StubHttpClient;
    use serde_json::json;

    use super::*;

    fn metadata() -> serde_json::Value {
        json!({
            "spreadsheetId": "ID",
            "properties": {"title": "Book", "timeZone": "America/Sao_Paulo"},
            "sheets": [
                {"properties": {"sheetId": 0, "title": "Sheet1"}},
                {"properties": {"sheetId": 7, "title": "Simple sheet"}},
            ],
        })
    }

    fn authorized(client: &StubHttpClient) -> AuthorizedSession<StubHttpClient> {
        AuthorizedSession::new(
            client.clone(),
            Some(Credentials::AccessToken("tok".to_string())),
        )
    }

    #[tokio::test]
    async fn anonymous_uses_url() {
        let client = StubHttpClient::new();
        let session = AuthorizedSession::anonymous(client.clone());
        let url = SheetUrl::parse("https://docs.google.com/spreadsheets/d/ID/edit#gid=7").unwrap();

        let address = SheetAddress::resolve(&session, &url).await.unwrap();
        assert_eq!(7, address.sheet_id);
        assert_eq!(None, address.sheet_name);
        assert_eq!(0, client.num_requests());
    }

    #[tokio::test]
    async fn name_and_timezone_from_gid() {
        let client = StubHttpClient::new();
        client.respond_json(Method::GET, "includeGridData=false", metadata());
        let url = SheetUrl::parse("https://docs.google.com/spreadsheets/d/ID/edit#gid=7").unwrap();

        let address = SheetAddress::resolve(&authorized(&client), &url).await.unwrap();
        assert_eq!(Some("Simple sheet".to_string()), address.sheet_name);
        assert_eq!(Some(chrono_tz::America::Sao_Paulo), address.timezone);
        assert_eq!(
            "https://sheets.googleapis.com/v4/spreadsheets/ID?includeGridData=false",
            client.requests()[0].url.as_str()
        );
    }

    #[tokio::test]
    async fn id_from_sheet_name() {
        let client = StubHttpClient::new();
        client.respond_json(Method::GET, "includeGridData=false", metadata());
        let url =
            SheetUrl::parse("https://docs.google.com/spreadsheets/d/ID/edit?sheet=Simple%20sheet")
                .unwrap();

        let address = SheetAddress::resolve(&authorized(&client), &url).await.unwrap();
        assert_eq!(7, address.sheet_id);
    }

    #[tokio::test]
    async fn unknown_sheet_is_not_fatal() {
        let client = StubHttpClient::new();
        client.respond_json(Method::GET, "includeGridData=false", metadata());
        let url = SheetUrl::parse("https://docs.google.com/spreadsheets/d/ID/edit#gid=99").unwrap();

        let address = SheetAddress::resolve(&authorized(&client), &url).await.unwrap();
        assert_eq!(None, address.sheet_name);
        assert_eq!(99, address.sheet_id);
    }

    #[tokio::test]
    async fn api_error() {
        let client = StubHttpClient::new();
        client.respond_json(
            Method::GET,
            "includeGridData=false",
            json!({"error": {"code": 404, "message": "Requested entity was not found."}}),
        );
        let url = SheetUrl::parse("https://docs.google.com/spreadsheets/d/ID/edit").unwrap();

        let err = SheetAddress::resolve(&authorized(&client), &url).await.unwrap_err();
        assert_eq!("Requested entity was not found.", err.get_msg());
    }
}
