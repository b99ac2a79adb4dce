//! Raw HTTP/1.1 message frames carried as payloads
//!
//! Payloads tagged as HTTP request/response are stored verbatim: start
//! line, CRLF-terminated headers, blank line, body. This module only checks
//! and splits that framing; it does not route or serve anything.

use serde::{Deserialize, Serialize};

use super::ProtocolError;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parsed HTTP start line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        version: String,
    },
    Response {
        version: String,
        status: u16,
        reason: String,
    },
}

/// An HTTP/1.x message split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMessage {
    pub start_line: StartLine,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpMessage {
    pub fn request(method: &str, target: &str) -> Self {
        Self {
            start_line: StartLine::Request {
                method: method.to_string(),
                target: target.to_string(),
                version: "HTTP/1.1".to_string(),
            },
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn response(status: u16, reason: &str) -> Self {
        Self {
            start_line: StartLine::Response {
                version: "HTTP/1.1".to_string(),
                status,
                reason: reason.to_string(),
            },
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets the body and a matching Content-Length header
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers
            .retain(|(n, _)| !n.eq_ignore_ascii_case("content-length"));
        self.headers
            .push(("Content-Length".to_string(), self.body.len().to_string()));
        self
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the exact wire framing
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.len());
        match &self.start_line {
            StartLine::Request {
                method,
                target,
                version,
            } => out.extend_from_slice(format!("{} {} {}\r\n", method, target, version).as_bytes()),
            StartLine::Response {
                version,
                status,
                reason,
            } => out.extend_from_slice(format!("{} {} {}\r\n", version, status, reason).as_bytes()),
        }
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

/// Parse a raw HTTP/1.x frame
pub fn parse_http_message(raw: &[u8]) -> Result<HttpMessage, ProtocolError> {
    let head_end = raw
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .ok_or_else(|| malformed("missing blank line after headers"))?;

    let head = std::str::from_utf8(&raw[..head_end]).map_err(|_| malformed("header is not UTF-8"))?;
    let body = raw[head_end + HEADER_TERMINATOR.len()..].to_vec();

    let mut lines = head.split("\r\n");
    let first = lines.next().unwrap_or_default();
    let start_line = parse_start_line(first)?;

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("bad header line '{}'", line)))?;
        if name.is_empty() || name.contains(' ') {
            return Err(malformed(format!("bad header name '{}'", name)));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let message = HttpMessage {
        start_line,
        headers,
        body,
    };

    if let Some(len) = message.header("content-length") {
        let declared: usize = len
            .parse()
            .map_err(|_| malformed(format!("bad Content-Length '{}'", len)))?;
        if declared != message.body.len() {
            return Err(malformed(format!(
                "Content-Length {} but body is {} bytes",
                declared,
                message.body.len()
            )));
        }
    }

    Ok(message)
}

fn parse_start_line(line: &str) -> Result<StartLine, ProtocolError> {
    let mut parts = line.splitn(3, ' ');
    let a = parts.next().unwrap_or_default();
    let b = parts.next().ok_or_else(|| malformed("short start line"))?;
    let c = parts.next().ok_or_else(|| malformed("short start line"))?;

    if a.starts_with("HTTP/1.") {
        let status: u16 = b
            .parse()
            .ok()
            .filter(|s| (100..=599).contains(s))
            .ok_or_else(|| malformed(format!("bad status '{}'", b)))?;
        return Ok(StartLine::Response {
            version: a.to_string(),
            status,
            reason: c.to_string(),
        });
    }

    if !c.starts_with("HTTP/1.") {
        return Err(malformed(format!("bad version '{}'", c)));
    }
    if a.is_empty() || !a.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(malformed(format!("bad method '{}'", a)));
    }
    Ok(StartLine::Request {
        method: a.to_string(),
        target: b.to_string(),
        version: c.to_string(),
    })
}

fn malformed(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedHttp(msg.into())
}
