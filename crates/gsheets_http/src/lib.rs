pub mod client;
pub mod google;
pub mod native;
pub mod stub;

// Re-export some types to use with the http client.
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, Request, StatusCode};
