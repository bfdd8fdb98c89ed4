//! HTTP response types and serialization.

use std::fs;
use std::path::Path;
use serde::Serialize;

use crate::server::error::Error;

/// Headers every response starts out with. Explicit `with_header` calls override them.
const DEFAULT_HEADERS: [(&str, &str); 3] = [
    ("Server", "microhttp-reactor"),
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Authorization, Content-Type"),
];

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    Conflict = 409,
    PayloadTooLarge = 413,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    HttpVersionNotSupported = 505,
}

impl StatusCode {
    /// Numeric status code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }
}

/// An HTTP response under construction.
///
/// Both a status line and a body must be set before [`to_bytes`](Self::to_bytes) succeeds.
/// `Content-Length` is always derived from the body; a manually set one is ignored.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: Option<(u16, String)>,
    /// Unique names (compared case-insensitively) in wire order.
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::empty()
    }
}

impl HttpResponse {
    /// Create a response with the given status code and its standard reason phrase, no body yet.
    pub fn new(status: StatusCode) -> Self {
        Self::empty().with_status(status.as_u16(), status.reason_phrase())
    }

    /// Create a response with neither status nor body; only the default headers are set.
    pub fn empty() -> Self {
        let headers = DEFAULT_HEADERS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Self {
            status: None,
            headers,
            body: None,
        }
    }

    /// Status, reason and text body in one go.
    pub fn text(code: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::empty().with_status(code, reason).with_body_string(body)
    }

    /// Set the status code and reason phrase.
    pub fn with_status(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.status = Some((code, reason.into()));
        self
    }

    /// Set the response body with a string, encoded as UTF-8.
    pub fn with_body_string(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into().into_bytes());
        self
    }

    /// Set the response body with bytes.
    pub fn with_body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Use the contents of a file as the body.
    pub fn with_file_body(self, path: impl AsRef<Path>) -> Result<Self, Error> {
        let body = fs::read(path)?;
        Ok(self.with_body_bytes(body))
    }

    /// Add or replace a header. A replaced header keeps its original position.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();

        match self.headers.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    /// Set the response body with a JSON value.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(value)?;
        Ok(self
            .with_content_type("application/json")
            .with_body_bytes(json))
    }

    /// Status code, if set.
    pub fn status_code(&self) -> Option<u16> {
        self.status.as_ref().map(|(code, _)| *code)
    }

    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body, if set.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Whether this response asks for the connection to be closed once written.
    pub fn closes_connection(&self) -> bool {
        self.get_header("Connection")
            .is_some_and(|value| value.split(',').any(|token| token.trim().eq_ignore_ascii_case("close")))
    }

    /// Serialize to wire bytes: status line, `Content-Length`, remaining headers, blank line, body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let (code, reason) = self.status.as_ref().ok_or(Error::IncompleteResponse("status line"))?;
        let body = self.body.as_ref().ok_or(Error::IncompleteResponse("body"))?;
        if reason.contains(['\r', '\n']) {
            return Err(Error::InvalidHead(reason.clone()));
        }

        let mut head = format!("HTTP/1.1 {code} {reason}\r\nContent-Length: {}\r\n", body.len());
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            if name.contains(['\r', '\n']) || value.contains(['\r', '\n']) {
                return Err(Error::InvalidHead(format!("{name}: {value}")));
            }
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");

        if !head.is_ascii() {
            return Err(Error::InvalidHead(head));
        }

        let mut bytes = Vec::with_capacity(head.len() + body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(body);
        Ok(bytes)
    }
}
