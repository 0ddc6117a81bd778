//! HTTP access to upstream operator APIs.
//!
//! Everything goes through the [`HttpClient`] seam so that decorators
//! (static headers, token sessions) compose and tests can script responses.

mod basic;
pub mod auth;
pub mod delta;
pub mod retry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use basic::BasicClient;
pub use delta::{DeltaCache, DeltaPlan};
pub use retry::RetryPolicy;
pub use session::{LoginSpec, TokenScheme, TokenSession};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request, Response, StatusCode, Url};

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Non-success response, including a 401 that survived every re-login.
    #[error("HTTP error {status} for url {url}")]
    Status { status: StatusCode, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("login response from {url} lacks token field `{field}`")]
    MissingToken { url: String, field: String },
}

/// Builds a GET request, appending `query` pairs to `url`.
pub fn get_request(url: &str, query: &[(&str, String)]) -> Result<Request> {
    let mut url = Url::parse(url)?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(Request::new(Method::GET, url))
}

/// Builds a POST request carrying `body` as JSON.
pub fn json_post_request(url: &str, body: &serde_json::Value) -> Result<Request> {
    let mut req = Request::new(Method::POST, Url::parse(url)?);
    req.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());
    Ok(req)
}
