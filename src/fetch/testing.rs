//! Scripted [`HttpClient`] for unit tests: replays canned responses in order
//! and records every request it receives.

use super::HttpClient;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use reqwest::{Method, Request, Response};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn authorization(&self) -> Option<String> {
        self.header(AUTHORIZATION.as_str())
    }
}

pub(crate) struct ScriptedClient {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<(u16, &str)>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        self.requests.lock().unwrap().push(SeenRequest {
            method: req.method().clone(),
            url: req.url().to_string(),
            headers: req.headers().clone(),
        });

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted response left for {}", req.url()));

        let response = http::Response::builder()
            .status(status)
            .body(body)
            .unwrap();
        Ok(Response::from(response))
    }
}
