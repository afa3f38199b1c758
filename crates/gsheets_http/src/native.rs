use std::pin::Pin;

use bytes::Bytes;
use futures::future::FutureExt;
use futures::{Stream, TryStreamExt};
use gsheets_error::{DbError, Result};
use reqwest::header::HeaderMap;
use reqwest::{Request, StatusCode};

use crate::client::{HttpClient, HttpResponse};

/// Http client backed by reqwest.
///
/// Requests must be awaited from within a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestHttpClient { client }
    }
}

impl HttpClient for ReqwestHttpClient {
    type Response = ReqwestHttpResponse;
    type RequestFuture = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn do_request(&self, request: Request) -> Self::RequestFuture {
        let fut = self.client.execute(request).map(|result| match result {
            Ok(resp) => Ok(ReqwestHttpResponse(resp)),
            Err(e) => Err(DbError::with_source("Failed to make request", Box::new(e))),
        });
        Box::pin(fut)
    }
}

#[derive(Debug)]
pub struct ReqwestHttpResponse(reqwest::Response);

impl HttpResponse for ReqwestHttpResponse {
    type BytesStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

    fn status(&self) -> StatusCode {
        self.0.status()
    }

    fn headers(&self) -> &HeaderMap {
        self.0.headers()
    }

    fn into_bytes_stream(self) -> Self::BytesStream {
        let stream = self
            .0
            .bytes_stream()
            .map_err(|e| DbError::with_source("Failed to stream body", Box::new(e)));
        Box::pin(stream)
    }
}
