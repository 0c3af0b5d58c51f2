//! Incoming request representation.
//!
//! The body is buffered once when the request is constructed, so any number
//! of conditions and the response body generator can read it.

use std::collections::HashMap;

/// A request as seen by conditions and body generators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockRequest {
    method: String,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl MockRequest {
    /// Create a request. A `?` in `target` splits off the query string.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        Self {
            method: method.into(),
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Shorthand for `MockRequest::new("GET", target)`.
    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    /// Shorthand for `MockRequest::new("POST", target)`.
    pub fn post(target: &str) -> Self {
        Self::new("POST", target)
    }

    /// Append a header. Repeated names keep every value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Decoded query parameters. The last occurrence of a key wins.
    pub fn query_params(&self) -> HashMap<String, String> {
        parse_query_string(self.query.as_deref().unwrap_or(""))
    }

    /// Decoded value of a single query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params().remove(name)
    }

    /// All headers in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header, looked up case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(percent_decode(key), percent_decode(value));
        } else {
            params.insert(percent_decode(part), String::new());
        }
    }

    params
}

/// Decode `%XX` escapes and `+` as space. Malformed escapes are kept verbatim.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let decoded = s
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
