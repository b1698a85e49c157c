//! Minimal header carriers for the upgrade exchange.
//!
//! Just enough of an HTTP request/response model for the negotiator to
//! read and write upgrade headers; the full message object model lives
//! with an external collaborator. Request lookup is case-insensitive,
//! response headers keep insertion order so serialized output is
//! deterministic.

use std::collections::HashMap;

use bytes::Bytes;

use super::HandshakeError;

/// An inbound upgrade request: method, URI, and headers.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    method: String,
    uri: String,
    /// Keys stored lowercase for case-insensitive lookup.
    headers: HashMap<String, String>,
}

impl UpgradeRequest {
    /// Creates a request with no headers.
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: HashMap::new(),
        }
    }

    /// Parses a request head from raw bytes (request line + headers).
    pub fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| HandshakeError::MalformedRequest("request head is not UTF-8"))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or(HandshakeError::MalformedRequest("empty request"))?;
        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or(HandshakeError::MalformedRequest("missing method"))?;
        let uri = parts
            .next()
            .ok_or(HandshakeError::MalformedRequest("missing request target"))?;

        let mut request = Self::new(method, uri);
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                request.set_header(name.trim(), value.trim());
            }
        }
        Ok(request)
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request target URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }
}

/// An outbound upgrade response: status line plus ordered headers.
#[derive(Debug, Clone)]
pub struct UpgradeResponse {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
}

impl UpgradeResponse {
    /// Creates a response with the given status line and no headers.
    #[must_use]
    pub fn new(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
        }
    }

    /// The `101 Switching Protocols` response.
    #[must_use]
    pub fn switching_protocols() -> Self {
        Self::new(101, "Switching Protocols")
    }

    /// The response status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any previous value under the same name
    /// (case-insensitive). New names keep insertion order in the output.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Serializes the response head to its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        Bytes::from(out)
    }
}
