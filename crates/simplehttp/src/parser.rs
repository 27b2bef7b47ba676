use bytes::Bytes;
use thiserror::Error;

use crate::{
    protocol::{Method, Version},
    url::{self, QueryParams},
};

/// A single request read from a connection.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    version: Version,
    target: String,
    path: String,
    query: Option<QueryParams>,
    headers: Vec<HeaderField>,
    body: Bytes,
    raw: Bytes,
    pub(crate) truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Less than the three request line tokens arrived.
    #[error("incomplete request line")]
    Incomplete,
    #[error("unsupported method \"{0}\"")]
    Method(String),
    /// The only parse failure that is answered with `400 Bad Request`.
    #[error("unsupported protocol version \"{0}\"")]
    Version(String),
}

impl ParseError {
    /// Whether the client should get a response for this failure.
    pub fn is_answered(&self) -> bool {
        matches!(self, ParseError::Version(_))
    }
}

impl Request {
    /// Parse the bytes of a single receive call.
    ///
    /// For GET, the target is split at the first `?` into the lookup path and the query
    /// parameters. For POST, the target is the path verbatim, and everything after the header
    /// block is the body. If no blank line arrived, the body is everything after the request
    /// line.
    pub fn parse(raw: Bytes) -> Result<Self, ParseError> {
        let mut tokens = raw
            .split(|byte| byte.is_ascii_whitespace())
            .filter(|token| !token.is_empty())
            .map(String::from_utf8_lossy);

        // Method is checked first, a non GET/POST request is dropped without a response
        let method = tokens.next().ok_or(ParseError::Incomplete)?;
        let method = Method::parse(&method).ok_or_else(|| ParseError::Method(method.into()))?;

        let target = tokens.next().ok_or(ParseError::Incomplete)?.into_owned();
        let version = tokens.next().ok_or(ParseError::Incomplete)?;
        let version =
            Version::parse(&version).ok_or_else(|| ParseError::Version(version.into()))?;

        let (path, query) = match method {
            Method::Get => {
                let query = url::parse_query(&target, true);
                let path = match target.split_once('?') {
                    Some((path, _)) => path.to_string(),
                    None => target.clone(),
                };
                (path, Some(query))
            }
            Method::Post => (target.clone(), None),
        };

        let (headers, body) = split_head(&raw);

        Ok(Self {
            method,
            version,
            target,
            path,
            query,
            headers,
            body,
            raw,
            truncated: false,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The request target as received, including any query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The route lookup key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters, only present on GET requests.
    pub fn query(&self) -> Option<&QueryParams> {
        self.query.as_ref()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.as_ref()?.get(key).map(String::as_str)
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    /// Find a header value, names are compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| field.value.as_str())
    }

    /// Body bytes, empty for GET requests.
    pub fn body(&self) -> &[u8] {
        match self.method {
            Method::Get => &[],
            Method::Post => &self.body,
        }
    }

    /// Everything received on the connection.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Whether the receive buffer filled up, in which case the request may be cut short.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Split the header fields following the request line from the body.
fn split_head(raw: &Bytes) -> (Vec<HeaderField>, Bytes) {
    let Some(line_end) = raw.iter().position(|byte| *byte == b'\n') else {
        return (Vec::new(), Bytes::new());
    };

    let mut headers = Vec::new();
    let mut start = line_end + 1;

    while let Some(length) = raw[start..].iter().position(|byte| *byte == b'\n') {
        let mut line = &raw[start..start + length];
        start += length + 1;

        // CRLF is the required newline, but a bare LF is accepted the same
        if let Some((&b'\r', rest)) = line.split_last() {
            line = rest;
        }

        // Empty line signals end of the header
        if line.is_empty() {
            return (headers, raw.slice(start..));
        }

        if let Some(field) = parse_field(line) {
            headers.push(field);
        }
    }

    // The header never ended, treat everything after the request line as body
    (Vec::new(), raw.slice(line_end + 1..))
}

fn parse_field(line: &[u8]) -> Option<HeaderField> {
    let split = line.iter().position(|byte| *byte == b':')?;
    let (name, value) = line.split_at(split);

    Some(HeaderField {
        name: String::from_utf8_lossy(name).trim().to_string(),
        value: String::from_utf8_lossy(&value[1..]).trim().to_string(),
    })
}
