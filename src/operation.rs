// =============================================================================
// operation.rs — DECLARING A REQUEST BEFORE ANYONE SENDS IT
// =============================================================================
//
// An Operation says what a remote call is: method, path, query, headers,
// body. It knows nothing about base URLs, timeouts or which HTTP stack ends
// up sending it. The client supplies those.
//
// Final request parameters are merged in increasing priority:
//
//   client defaults (timeout)
//     < the Operation's own fields (method, base_url + path, params, headers, body)
//       < the caller's per-call overrides
//
// so a call site can override anything, method and URL included, without
// the Operation caring. Header names compare case-insensitively, as on the
// wire.
// =============================================================================

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Patch => write!(f, "PATCH"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A declarative description of one remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl Operation {
    /// Build an operation. The path must start with `/`; anything else is
    /// rejected here rather than producing a mangled URL later.
    pub fn new(method: Method, path: impl Into<String>) -> Result<Self, ClientError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(ClientError::Validation(format!(
                "path must start with `/`: {path:?}"
            )));
        }
        Ok(Self {
            method,
            path,
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
        })
    }

    pub fn get(path: impl Into<String>) -> Result<Self, ClientError> {
        Self::new(Method::Get, path)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        upsert(&mut self.params, key.into(), value.to_string());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert_header(&mut self.headers, key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Per-call overrides. Anything set here beats the Operation and the
/// client defaults.
#[derive(Debug, Clone)]
pub struct RequestOverrides {
    pub method: Option<Method>,
    /// Replaces `base_url + path` outright.
    pub url: Option<Url>,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    /// When true (the default), non-2xx responses become `HttpStatus` errors.
    pub raise_for_status: bool,
}

impl Default for RequestOverrides {
    fn default() -> Self {
        Self {
            method: None,
            url: None,
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            raise_for_status: true,
        }
    }
}

impl RequestOverrides {
    /// Overrides that hand error responses back untouched.
    pub fn unchecked() -> Self {
        Self {
            raise_for_status: false,
            ..Self::default()
        }
    }
}

/// The fully merged parameters of one concrete request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    pub method: Method,
    pub url: Url,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub raise_for_status: bool,
}

impl RequestParams {
    /// Merge client defaults, the operation and the caller's overrides.
    pub fn build(
        base_url: &Url,
        default_timeout: Duration,
        operation: &Operation,
        overrides: RequestOverrides,
    ) -> Result<Self, ClientError> {
        let url = match overrides.url {
            Some(url) => url,
            None => Url::parse(&format!(
                "{}{}",
                base_url.as_str().trim_end_matches('/'),
                operation.path
            ))?,
        };

        let mut params = operation.params.clone();
        for (key, value) in overrides.params {
            upsert(&mut params, key, value);
        }

        let mut headers = operation.headers.clone();
        for (key, value) in overrides.headers {
            upsert_header(&mut headers, key, value);
        }

        Ok(Self {
            method: overrides.method.unwrap_or(operation.method),
            url,
            params,
            headers,
            body: overrides.body.or_else(|| operation.body.clone()),
            timeout: overrides.timeout.unwrap_or(default_timeout),
            raise_for_status: overrides.raise_for_status,
        })
    }

    /// Apply these parameters to the async transport.
    pub fn to_async(&self, session: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = session
            .request(self.method.as_reqwest(), self.url.clone())
            .query(&self.params)
            .timeout(self.timeout);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            builder = builder.json(body);
        }
        builder
    }

    /// Apply these parameters to the blocking transport.
    pub fn to_blocking(&self, session: &reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder {
        let mut builder = session
            .request(self.method.as_reqwest(), self.url.clone())
            .query(&self.params)
            .timeout(self.timeout);
        for (key, value) in &self.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &self.body {
            builder = builder.json(body);
        }
        builder
    }
}

/// Replace the value for `key` if present, append otherwise.
fn upsert(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    match pairs.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
}

/// Like `upsert`, but `Accept` and `accept` are the same header. The newer
/// spelling wins along with the newer value.
fn upsert_header(pairs: &mut Vec<(String, String)>, key: String, value: String) {
    match pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
        Some(slot) => *slot = (key, value),
        None => pairs.push((key, value)),
    }
}
