//! Token-authenticated access to an upstream API.
//!
//! A [`TokenSession`] logs in lazily, attaches the token to every data
//! request and logs in again when the upstream answers `401`. Each retry,
//! whether caused by an expired token or a transient failure, sleeps for
//! [`RetryPolicy::delay`] first so concurrent clients sharing credentials do
//! not keep invalidating each other's tokens. The token lives on the session
//! instance; two sessions never share one.

use super::retry::{RetryPolicy, is_transient_error, is_transient_status, send_with_retry};
use super::{FetchError, HttpClient, get_request, json_post_request};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

/// How the token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: <token>`
    Raw,
}

impl TokenScheme {
    fn header_value(self, token: &str) -> Result<HeaderValue> {
        let mut value = match self {
            TokenScheme::Bearer => HeaderValue::from_str(&format!("Bearer {token}"))?,
            TokenScheme::Raw => HeaderValue::from_str(token)?,
        };
        value.set_sensitive(true);
        Ok(value)
    }
}

/// Where and how to obtain a token.
#[derive(Debug, Clone)]
pub struct LoginSpec {
    pub url: String,
    /// JSON body posted to `url`, usually the credentials.
    pub body: Value,
    /// Field of the login response holding the token.
    pub token_field: String,
    pub scheme: TokenScheme,
}

pub struct TokenSession<C> {
    client: C,
    login: LoginSpec,
    policy: RetryPolicy,
    token: Option<String>,
}

impl<C: HttpClient> TokenSession<C> {
    pub fn new(client: C, login: LoginSpec, policy: RetryPolicy) -> Self {
        Self {
            client,
            login,
            policy,
            token: None,
        }
    }

    #[cfg(test)]
    fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// The unauthenticated client, for endpoints that need no token.
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Posts the login request and stores the returned token.
    pub async fn authenticate(&mut self) -> Result<String> {
        let login = &self.login;
        debug!(url = %login.url, "Logging in");

        let response = send_with_retry(&self.client, &self.policy, || {
            json_post_request(&login.url, &login.body)
        })
        .await?;
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Invalid login response from {}", login.url))?;

        let token = body
            .get(&login.token_field)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::MissingToken {
                url: login.url.clone(),
                field: login.token_field.clone(),
            })?
            .to_string();

        self.token = Some(token.clone());
        Ok(token)
    }

    /// GET `url` with the session token and parse the body as JSON.
    ///
    /// A `401` discards the token and logs in again before the next attempt.
    /// Once [`RetryPolicy::max_attempts`] is reached, the last failure is
    /// returned as [`FetchError::Status`] or [`FetchError::Transport`].
    pub async fn get_json(&mut self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let mut attempt = 1;
        loop {
            let token = match self.token.clone() {
                Some(token) => token,
                None => self.authenticate().await?,
            };

            let mut req = get_request(url, query)?;
            req.headers_mut()
                .insert(AUTHORIZATION, self.login.scheme.header_value(&token)?);
            let req_url = req.url().to_string();

            match self.client.execute(req).await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Invalid JSON from {req_url}"));
                }
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::UNAUTHORIZED || is_transient_status(status);
                    if !retryable || attempt >= self.policy.max_attempts {
                        return Err(FetchError::Status { status, url: req_url }.into());
                    }
                    if status == StatusCode::UNAUTHORIZED {
                        self.token = None;
                        warn!(url = %req_url, attempt, "Token rejected, logging in again");
                    } else {
                        warn!(url = %req_url, %status, attempt, "Transient HTTP status, retrying");
                    }
                }
                Err(source) => {
                    if !is_transient_error(&source) || attempt >= self.policy.max_attempts {
                        return Err(FetchError::Transport { url: req_url, source }.into());
                    }
                    warn!(url = %req_url, error = %source, attempt, "Transient transport error, retrying");
                }
            }

            self.policy.backoff(attempt).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedClient;
    use reqwest::Method;
    use serde_json::json;
    use std::time::Duration;

    fn session(responses: Vec<(u16, &str)>, scheme: TokenScheme, field: &str) -> TokenSession<ScriptedClient> {
        TokenSession::new(
            ScriptedClient::new(responses),
            LoginSpec {
                url: "https://api.example.org/login".to_string(),
                body: json!({"username": "u", "password": "p"}),
                token_field: field.to_string(),
                scheme,
            },
            RetryPolicy::new(3, Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_expired_token_triggers_relogin() {
        let mut session = session(
            vec![
                (200, r#"{"token": "first"}"#),
                (401, ""),
                (200, r#"{"token": "second"}"#),
                (200, r#"{"vehicles": []}"#),
            ],
            TokenScheme::Bearer,
            "token",
        );

        let body = session
            .get_json("https://api.example.org/vehicles", &[])
            .await
            .unwrap();
        assert_eq!(body, json!({"vehicles": []}));

        let seen = session.client.requests();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[1].authorization().as_deref(), Some("Bearer first"));
        assert_eq!(seen[2].method, Method::POST);
        assert_eq!(seen[3].authorization().as_deref(), Some("Bearer second"));
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_is_bounded() {
        let mut session = session(
            vec![
                (200, r#"{"token": "a"}"#),
                (401, ""),
                (200, r#"{"token": "b"}"#),
                (401, ""),
                (200, r#"{"token": "c"}"#),
                (401, ""),
            ],
            TokenScheme::Bearer,
            "token",
        );

        let err = session
            .get_json("https://api.example.org/vehicles", &[])
            .await
            .unwrap_err();

        match err.downcast_ref::<FetchError>() {
            Some(FetchError::Status { status, .. }) => assert_eq!(*status, StatusCode::UNAUTHORIZED),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.client.remaining(), 0);
    }

    #[tokio::test]
    async fn test_raw_scheme_and_custom_token_field() {
        let mut session = session(
            vec![(200, r#"{"_id": "abc123"}"#), (200, "[]")],
            TokenScheme::Raw,
            "_id",
        );

        session
            .get_json("https://api.example.org/locations", &[])
            .await
            .unwrap();

        assert!(session.has_token());
        assert_eq!(session.client.requests()[1].authorization().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn test_token_is_reused_across_requests() {
        let mut session = session(
            vec![(200, r#"{"token": "t"}"#), (200, "[]"), (200, "[]")],
            TokenScheme::Bearer,
            "token",
        );

        session.get_json("https://api.example.org/a", &[]).await.unwrap();
        session.get_json("https://api.example.org/b", &[]).await.unwrap();

        let posts = session
            .client
            .requests()
            .iter()
            .filter(|r| r.method == Method::POST)
            .count();
        assert_eq!(posts, 1);
    }

    #[tokio::test]
    async fn test_missing_token_field() {
        let mut session = session(vec![(200, r#"{"status": "ok"}"#)], TokenScheme::Bearer, "token");

        let err = session
            .get_json("https://api.example.org/vehicles", &[])
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FetchError>(),
            Some(FetchError::MissingToken { field, .. }) if field == "token"
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_retried_with_same_token() {
        let mut session = session(
            vec![(200, r#"{"token": "t"}"#), (502, ""), (200, r#"{"ok": 1}"#)],
            TokenScheme::Bearer,
            "token",
        );

        let body = session
            .get_json("https://api.example.org/vehicles", &[("globalVersion", "7".to_string())])
            .await
            .unwrap();
        assert_eq!(body, json!({"ok": 1}));

        let seen = session.client.requests();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].url, "https://api.example.org/vehicles?globalVersion=7");
        assert_eq!(seen[2].authorization().as_deref(), Some("Bearer t"));
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let mut session = session(vec![(200, r#"{"token": "t"}"#), (403, "")], TokenScheme::Bearer, "token");

        let err = session
            .get_json("https://api.example.org/vehicles", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("HTTP error 403"));
    }
}
