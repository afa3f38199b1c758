use std::fmt::Debug;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use gsheets_error::{Result, ResultExt};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Request, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait HttpClient: Sync + Send + Debug + Clone + 'static {
    type Response: HttpResponse;
    type RequestFuture: Future<Output = Result<Self::Response>> + Send + Unpin;

    /// Do the request.
    fn do_request(&self, request: Request) -> Self::RequestFuture;
}

pub trait HttpResponse: Send {
    type BytesStream: Stream<Item = Result<Bytes>> + Send + Unpin;

    fn status(&self) -> StatusCode;
    fn headers(&self) -> &HeaderMap;

    /// Convert the response body into a byte stream.
    fn into_bytes_stream(self) -> Self::BytesStream;
}

/// Helper to set a json body on this request.
///
/// Overwrites the existing body and 'Content-Type' of the request.
pub fn set_json_body<T>(request: &mut Request, body: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(body).context("Failed to serialize request body to json")?;
    *request.body_mut() = Some(body.into());
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(())
}

/// Helper to set a form body on this request.
///
/// Overwrites the existing body and 'Content-Type' of the request.
pub fn set_form_body<T>(request: &mut Request, body: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let body = serde_urlencoded::to_string(body)
        .context("Failed to serialize request body to url encoded form")?;
    *request.body_mut() = Some(body.into());
    request.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );

    Ok(())
}

/// Collect the full body of a response.
pub async fn read_body<S>(mut stream: S) -> Result<Vec<u8>>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let mut bytes = Vec::new();
    while let Some(resp) = stream.try_next().await? {
        bytes.extend_from_slice(resp.as_ref());
    }
    Ok(bytes)
}

/// Helper to read a text response from a byte stream.
///
/// Invalid utf8 is replaced.
pub async fn read_text_response<S>(stream: S) -> Result<String>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let bytes = read_body(stream).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Helper to read a json response from a byte stream.
///
/// This will collect the full response before trying to deserialize it.
pub async fn read_json_response<T, S>(stream: S) -> Result<T>
where
    T: DeserializeOwned,
    S: Stream<Item = Result<Bytes>> + Send + Unpin,
{
    let bytes = read_body(stream).await?;
    serde_json::from_slice(&bytes).context("Failed to deserialize response body as json")
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use reqwest::Method;
    use url::Url;

    use super::*;

    #[test]
    fn json_body_sets_content_type() {
        let mut request = Request::new(
            Method::POST,
            Url::parse("https://sheets.googleapis.com/v4/spreadsheets/abc:batchUpdate").unwrap(),
        );
        set_json_body(&mut request, &serde_json::json!({"requests": []})).unwrap();

        assert_eq!(
            "application/json",
            request.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap()
        );
        let body = request.body().unwrap().as_bytes().unwrap();
        assert_eq!(br#"{"requests":[]}"#, body);
    }

    #[test]
    fn form_body_encodes_pairs() {
        let mut request = Request::new(
            Method::POST,
            Url::parse("https://oauth2.googleapis.com/token").unwrap(),
        );
        set_form_body(&mut request, &[("grant_type", "a b"), ("assertion", "x.y")]).unwrap();

        let body = request.body().unwrap().as_bytes().unwrap();
        assert_eq!(b"grant_type=a+b&assertion=x.y", body);
    }

    #[tokio::test]
    async fn read_chunked_json() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(br#"{"status":"#)),
            Ok(Bytes::from_static(br#""ok"}"#)),
        ];
        let value: serde_json::Value = read_json_response(stream::iter(chunks)).await.unwrap();
        assert_eq!(serde_json::json!({"status": "ok"}), value);
    }
}
