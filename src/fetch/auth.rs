use super::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sets one fixed header on every request.
///
/// Used for static API keys and for operators that insist on a particular
/// `User-Agent`. Header name and value are validated on construction.
pub struct StaticHeader<C> {
    inner: C,
    name: HeaderName,
    value: HeaderValue,
}

impl<C> StaticHeader<C> {
    pub fn new(inner: C, name: &str, value: &str) -> Result<Self> {
        Ok(Self {
            inner,
            name: HeaderName::from_bytes(name.as_bytes())?,
            value: HeaderValue::from_str(value)?,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for StaticHeader<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
