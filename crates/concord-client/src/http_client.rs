//! reqwest-based Concord API client
//!
//! Direct implementation of the `ConcordClient` trait. Makes one request per
//! call and turns error responses into [`RequestError`]s.

use crate::client::ConcordClient;
use crate::credentials::ApiKeyResolver;
use crate::error::{Error, RangeParseError, RequestError, Result};
use crate::pagination::Pagination;
use crate::range;
use crate::types::{
    InstanceId, LogChunk, LogRange, LogSegmentEntry, PaginatedLogSegmentEntry, ProcessEntry,
    SegmentFilter, SegmentId,
};
use async_trait::async_trait;
use concord_config::AppConfig;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE, CONTENT_TYPE, COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Content type of Concord's validation error responses
pub const VALIDATION_ERRORS_TYPE: &str = "application/vnd.concord-validation-errors-v1+json";

/// Connection settings of an [`HttpClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub session_cookie: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Settings from the app config, with the API key resolved for its server
    pub fn from_app_config(config: &AppConfig) -> Self {
        let resolver = ApiKeyResolver::new(config.api_key.clone());
        Self {
            base_url: config.server_url.clone(),
            api_key: resolver.resolve(&config.server_url),
            session_cookie: config.session_cookie.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// Direct Concord API client using reqwest
///
/// This is the base implementation that makes actual API calls.
/// It can be wrapped by `ThrottledClient` to space calls out.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| Error::Config("API key is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(cookie) = &config.session_cookie {
            let mut value = HeaderValue::from_str(cookie).map_err(|_| {
                Error::Config("session cookie is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and turn non-2xx responses into errors
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(Error::Transport)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await.into())
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Decode(e.to_string()))
    }

    async fn fetch_chunk(&self, url: String, requested: &LogRange) -> Result<LogChunk> {
        debug!("GET {} ({})", url, range::request_header_value(requested));

        let response = self
            .send(self.http.get(&url).headers(range::encode_request(requested)))
            .await?;

        let range = {
            let status = response.status().as_u16();
            let header = response
                .headers()
                .get(CONTENT_RANGE)
                .ok_or_else(|| RequestError::missing_range(status))?;
            let header = header.to_str().map_err(|_| {
                RangeParseError::new("Invalid Content-Range header: not visible ASCII")
            })?;
            range::decode_response(header)?
        };

        let data = response.text().await.map_err(Error::Transport)?;
        Ok(LogChunk { data, range })
    }
}

#[async_trait]
impl ConcordClient for HttpClient {
    async fn get_process(&self, instance_id: &InstanceId) -> Result<ProcessEntry> {
        let url = self.url(&format!("/api/v1/process/{}", instance_id));
        debug!("GET {}", url);
        self.get_json(self.http.get(&url)).await
    }

    async fn get_log(&self, instance_id: &InstanceId, range: &LogRange) -> Result<LogChunk> {
        let url = self.url(&format!("/api/v1/process/{}/log", instance_id));
        self.fetch_chunk(url, range).await
    }

    async fn get_segment_log(
        &self,
        instance_id: &InstanceId,
        segment_id: SegmentId,
        range: &LogRange,
    ) -> Result<LogChunk> {
        let url = self.url(&format!(
            "/api/v2/process/{}/log/segment/{}/data",
            instance_id, segment_id
        ));
        self.fetch_chunk(url, range).await
    }

    async fn list_log_segments(
        &self,
        instance_id: &InstanceId,
        page: Pagination,
        filter: SegmentFilter,
    ) -> Result<PaginatedLogSegmentEntry> {
        let url = self.url(&format!("/api/v2/process/{}/log/segment", instance_id));
        debug!(
            "GET {} (offset {}, limit {}, {:?})",
            url,
            page.offset(),
            page.limit(),
            filter
        );

        // one extra item tells us whether there is a next page
        let request = self
            .http
            .get(&url)
            .query(&[("offset", page.offset()), ("limit", page.fetch_limit())])
            .query(&filter.query());
        let items: Vec<LogSegmentEntry> = self.get_json(request).await?;

        Ok(page.paginate(items))
    }
}

/// One entry of a validation error response
#[derive(Debug, Deserialize)]
struct ValidationError {
    message: String,
}

/// Concord's generic JSON error body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    message: Option<String>,
    details: Option<String>,
    instance_id: Option<String>,
    level: Option<String>,
}

async fn error_from_response(response: Response) -> RequestError {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    let error = request_error(status, content_type.as_deref(), &body);
    debug!("Request failed: {} ({})", error.message, status);
    error
}

/// Build the error for a non-2xx response
///
/// Strategies are tried by content type: validation errors, then a JSON
/// envelope, then plain text. Anything that yields no message falls back
/// to the status line.
pub fn request_error(status: StatusCode, content_type: Option<&str>, body: &str) -> RequestError {
    let code = status.as_u16();
    let content_type = content_type.unwrap_or_default();

    if content_type.starts_with(VALIDATION_ERRORS_TYPE) {
        if let Some(message) = validation_message(body) {
            return RequestError::new(code, message);
        }
    } else if content_type.contains("json") {
        if let Some(error) = envelope_error(code, body) {
            return error;
        }
    } else if content_type.starts_with("text/") {
        let text = body.trim();
        if !text.is_empty() {
            return RequestError::new(code, text);
        }
    }

    RequestError::new(
        code,
        format!(
            "{} ({})",
            status.canonical_reason().unwrap_or("Unknown error"),
            code
        ),
    )
}

fn validation_message(body: &str) -> Option<String> {
    let errors: Vec<ValidationError> = serde_json::from_str(body).ok()?;
    let messages: Vec<&str> = errors
        .iter()
        .map(|e| e.message.as_str())
        .filter(|m| !m.is_empty())
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

fn envelope_error(code: u16, body: &str) -> Option<RequestError> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let message = envelope.message.filter(|m| !m.is_empty())?;
    Some(RequestError {
        status: Some(code),
        message,
        details: envelope.details,
        instance_id: envelope.instance_id,
        level: envelope.level,
    })
}
