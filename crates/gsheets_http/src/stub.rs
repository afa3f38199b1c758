//! In-memory http client that replays canned responses.
//!
//! Routes are matched in the order they were added. A route matches when the
//! method is equal and the full url contains the route's pattern. Each route
//! holds a queue of responses; the last response in a queue is reused for
//! any further matching requests.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{Ready, ready};
use futures::stream::{Once, once};
use gsheets_error::{DbError, Result};
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request, StatusCode};
use url::Url;

use crate::client::{HttpClient, HttpResponse};

#[derive(Debug, Clone, Default)]
pub struct StubHttpClient {
    state: Arc<Mutex<StubState>>,
}

#[derive(Debug, Default)]
struct StubState {
    routes: Vec<StubRoute>,
    requests: Vec<RecordedRequest>,
}

#[derive(Debug)]
struct StubRoute {
    method: Method,
    pattern: String,
    responses: VecDeque<StubResponse>,
}

/// A request seen by the stub client.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl RecordedRequest {
    /// Deserialize the request body as json.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

#[derive(Debug, Clone)]
pub struct StubResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl StubResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        StubResponse {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self::new(StatusCode::OK, value.to_string())
    }
}

impl StubHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for requests with the given method whose url
    /// contains `pattern`.
    pub fn respond(&self, method: Method, pattern: impl Into<String>, response: StubResponse) {
        let pattern = pattern.into();
        let mut state = self.state.lock();
        let existing = state
            .routes
            .iter()
            .position(|route| route.method == method && route.pattern == pattern);
        match existing {
            Some(idx) => state.routes[idx].responses.push_back(response),
            None => state.routes.push(StubRoute {
                method,
                pattern,
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Shorthand for a 200 response with a json body.
    pub fn respond_json(
        &self,
        method: Method,
        pattern: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.respond(method, pattern, StubResponse::ok_json(&value))
    }

    /// All requests made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn num_requests(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn next_response(&self, request: &Request) -> Result<StubResponse> {
        let mut state = self.state.lock();
        state.requests.push(RecordedRequest {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|body| body.as_bytes())
                .map(|body| body.to_vec()),
        });

        let url = request.url().as_str();
        let route = state
            .routes
            .iter_mut()
            .find(|route| &route.method == request.method() && url.contains(&route.pattern))
            .ok_or_else(|| {
                DbError::new("No stub response for request")
                    .with_field("method", request.method())
                    .with_field("url", url)
            })?;

        let response = if route.responses.len() > 1 {
            route.responses.pop_front()
        } else {
            route.responses.front().cloned()
        };

        response.ok_or_else(|| DbError::new("Stub route has no responses"))
    }
}

impl HttpClient for StubHttpClient {
    type Response = StubResponse;
    type RequestFuture = Ready<Result<StubResponse>>;

    fn do_request(&self, request: Request) -> Self::RequestFuture {
        ready(self.next_response(&request))
    }
}

impl HttpResponse for StubResponse {
    type BytesStream = Once<Ready<Result<Bytes>>>;

    fn status(&self) -> StatusCode {
        self.status
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn into_bytes_stream(self) -> Self::BytesStream {
        once(ready(Ok(self.body)))
    }
}
