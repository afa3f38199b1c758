use chrono::{DateTime, Duration, Utc};
use gsheets_error::{DbError, Result};
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use reqwest::{Method, Request, StatusCode};
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use super::credentials::ServiceAccount;
use crate::client::{HttpClient, HttpResponse, read_text_response, set_json_body};

/// Tokens are refreshed this long before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// How requests made through a session are authorized.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A bearer token obtained elsewhere.
    AccessToken(String),
    /// Service account key exchanged for short lived tokens, optionally
    /// impersonating `subject`.
    ServiceAccount {
        account: ServiceAccount,
        subject: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// A response whose body has been fully read.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub status: StatusCode,
    pub text: String,
}

impl TextResponse {
    /// Parse the body as json.
    ///
    /// Error responses from the google apis are json too, so the status is
    /// not checked here.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.text).map_err(|e| {
            DbError::with_source("Failed to deserialize response body as json", Box::new(e))
                .with_field("status", self.status)
        })
    }
}

/// Http session with authorization applied to every request.
///
/// Sessions without credentials make anonymous requests, which is enough to
/// read public sheets.
#[derive(Debug)]
pub struct AuthorizedSession<C: HttpClient> {
    client: C,
    credentials: Option<Credentials>,
    cached: Mutex<Option<CachedToken>>,
}

impl<C> AuthorizedSession<C>
where
    C: HttpClient,
{
    pub fn new(client: C, credentials: Option<Credentials>) -> Self {
        AuthorizedSession {
            client,
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn anonymous(client: C) -> Self {
        Self::new(client, None)
    }

    pub fn is_authorized(&self) -> bool {
        self.credentials.is_some()
    }

    /// Get the bearer token to use for the next request, refreshing it if
    /// needed.
    async fn bearer_token(&self) -> Result<Option<String>> {
        let (account, subject) = match &self.credentials {
            None => return Ok(None),
            Some(Credentials::AccessToken(token)) => return Ok(Some(token.clone())),
            Some(Credentials::ServiceAccount { account, subject }) => (account, subject),
        };

        let now = Utc::now();
        let cached = self.cached.lock().clone();
        if let Some(cached) = cached {
            if cached.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(Some(cached.token));
            }
        }

        debug!(email = %account.client_email(), "refreshing access token");
        let token = account
            .fetch_access_token(&self.client, subject.as_deref())
            .await?;
        let cached = CachedToken {
            token: token.access_token.clone(),
            expires_at: token.expires_at(now),
        };
        *self.cached.lock() = Some(cached);

        Ok(Some(token.access_token))
    }

    async fn send(&self, mut request: Request) -> Result<TextResponse> {
        if let Some(token) = self.bearer_token().await? {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| DbError::new("Access token is not a valid header value"))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        trace!(method = %request.method(), url = %request.url(), "sending request");

        let resp = self.client.do_request(request).await?;
        let status = resp.status();
        let text = read_text_response(resp.into_bytes_stream()).await?;

        Ok(TextResponse { status, text })
    }

    /// GET a url, attaching any extra headers.
    pub async fn get(
        &self,
        url: Url,
        headers: &[(HeaderName, HeaderValue)],
    ) -> Result<TextResponse> {
        let mut request = Request::new(Method::GET, url);
        for (name, value) in headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
        self.send(request).await
    }

    /// POST a json body.
    pub async fn post_json<T>(&self, url: Url, body: &T) -> Result<TextResponse>
    where
        T: Serialize + ?Sized,
    {
        let mut request = Request::new(Method::POST, url);
        set_json_body(&mut request, body)?;
        self.send(request).await
    }

    /// PUT a json body.
    pub async fn put_json<T>(&self, url: Url, body: &T) -> Result<TextResponse>
    where
        T: Serialize + ?Sized,
    {
        let mut request = Request::new(Method::PUT, url);
        set_json_body(&mut request, body)?;
        self.send(request).await
    }
}
