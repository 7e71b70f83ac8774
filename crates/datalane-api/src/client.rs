// HTTP transport
//
// Wraps `reqwest::Client` with base-URL resolution, query/body encoding
// and backend error extraction. Responses are returned as raw JSON; the
// orchestration layer decides what they mean.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::request::{Method, Request, Response};
use crate::transport::TransportConfig;

/// The raw network call the orchestration layer drives.
///
/// Implementations resolve to a [`Response`] for 2xx statuses and to an
/// [`Error`] for everything else.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(&self, request: Request) -> Result<Response, Error>;
}

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── HttpTransport ────────────────────────────────────────────────────

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Option<Url>,
    timeout: Duration,
}

impl HttpTransport {
    /// Build from a transport config. `base_url` is used to resolve
    /// relative request URLs; absolute URLs bypass it.
    pub fn new(base_url: Option<&str>, config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        let base_url = base_url.map(normalize_base_url).transpose()?;
        Ok(Self {
            http,
            base_url,
            timeout: config.timeout,
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: Option<&str>, http: reqwest::Client) -> Result<Self, Error> {
        let base_url = base_url.map(normalize_base_url).transpose()?;
        Ok(Self {
            http,
            base_url,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a request URL: absolute URLs are used as-is, anything else
    /// is joined onto the base URL.
    pub fn resolve(&self, raw: &str) -> Result<Url, Error> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match self.base_url {
                Some(ref base) => Ok(base.join(raw.trim_start_matches('/'))?),
                None => Err(Error::InvalidUrl(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(e) => Err(Error::InvalidUrl(e)),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        let raw = resp.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<ErrorResponse>(&raw) {
            Ok(
                ErrorResponse {
                    message: Some(m), ..
                }
                | ErrorResponse { error: Some(m), .. },
            ) => m,
            _ if raw.is_empty() => status
                .canonical_reason()
                .map_or_else(|| status.to_string(), str::to_owned),
            _ => raw,
        };

        Error::Http {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: Request) -> Result<Response, Error> {
        let url = self.resolve(&request.url)?;
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.http.request(request.method.to_reqwest(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match (request.method, &request.body) {
            (Method::Get, Some(_)) => builder.query(&request.query_pairs()),
            (_, Some(body)) => builder.json(body),
            (_, None) => builder,
        };

        let resp = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Self::parse_error(status, resp).await);
        }

        let text = resp.text().await.map_err(|e| self.map_send_error(e))?;
        Ok(Response {
            status: status.as_u16(),
            body: decode_body(&text),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Ensure the base URL path ends with `/` so relative joins append.
fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));
    Ok(url)
}

/// Empty bodies decode to `null`, non-JSON bodies to a JSON string.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
