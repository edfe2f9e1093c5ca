//! Purpose: Blocking HTTP client helpers shared by the client-side drills.
//! Exports: `HttpClient`, `Response`, `parse_http_url`.
//! Role: Thin wrapper over `ureq` that returns every status as a `Response`.
//! Invariants: Only `http`/`https` URLs are accepted.
//! Invariants: A configured deadline bounds the whole request; expiry is `ErrorKind::Timeout`.
#![allow(clippy::result_large_err)]

use serde::Serialize;
use std::io::Read;
use std::time::Duration;
use url::Url;

use crate::core::error::{Error, ErrorKind};

const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpClient {
    /// A client without any deadline. A peer that never answers blocks the caller forever.
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            timeout: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            timeout: Some(timeout),
        }
    }

    pub fn get(&self, url: &str) -> Result<Response, Error> {
        let url = parse_http_url(url)?;
        let result = self.agent.request("GET", url.as_str()).call();
        self.finish(&url, result)
    }

    pub fn head(&self, url: &str) -> Result<Response, Error> {
        let url = parse_http_url(url)?;
        let result = self.agent.request("HEAD", url.as_str()).call();
        self.finish(&url, result)
    }

    pub fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<Response, Error> {
        let url = parse_http_url(url)?;
        let result = self
            .agent
            .request("POST", url.as_str())
            .set("Content-Type", content_type)
            .send_bytes(body);
        self.finish(&url, result)
    }

    pub fn post_json<T: Serialize>(&self, url: &str, value: &T) -> Result<Response, Error> {
        let mut payload = serde_json::to_vec(value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        payload.push(b'\n');
        self.post(url, "application/json", &payload)
    }

    fn finish(
        &self,
        url: &Url,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<Response, Error> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(err)) => {
                return Err(transport_error(err, self.timeout).with_url(url.as_str()));
            }
        };
        read_response(response).map_err(|err| {
            let err = if err.kind() == ErrorKind::Io && self.timeout.is_some() && is_timeout(&err) {
                Error::new(ErrorKind::Timeout)
                    .with_message("deadline exceeded while reading response body")
                    .with_source(err)
            } else {
                err
            };
            err.with_url(url.as_str())
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Case-insensitive header lookup; returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn expect_status(self, expected: u16) -> Result<Self, Error> {
        if self.status != expected {
            return Err(Error::new(ErrorKind::Status)
                .with_message(format!(
                    "expected status {expected}, actual status {}",
                    self.status
                ))
                .with_status(self.status));
        }
        Ok(self)
    }
}

pub fn parse_http_url(raw: &str) -> Result<Url, Error> {
    let url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid url")
            .with_url(raw)
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("url must use http or https scheme")
            .with_url(raw));
    }
    Ok(url)
}

fn read_response(response: ureq::Response) -> Result<Response, Error> {
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .flat_map(|name| {
            response
                .all(&name)
                .into_iter()
                .map(|value| (name.clone(), value.to_string()))
                .collect::<Vec<_>>()
        })
        .collect();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut body)
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read response body")
                .with_source(err)
        })?;
    Ok(Response {
        status,
        headers,
        body,
    })
}

fn transport_error(err: ureq::Transport, timeout: Option<Duration>) -> Error {
    if let Some(timeout) = timeout {
        if is_timeout(&err) {
            return Error::new(ErrorKind::Timeout)
                .with_message(format!("no response within {}ms", timeout.as_millis()))
                .with_source(err);
        }
    }
    Error::new(ErrorKind::Io)
        .with_message("request failed")
        .with_source(err)
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        current = err.source();
    }
    false
}
