//! Response writing.

/// Sink the handler writes a matched rule's response onto.
///
/// Calls arrive in order: headers, then status, then body.
pub trait ResponseWriter {
    /// Add a header value. A name may be added more than once.
    fn add_header(&mut self, name: &str, value: &str);

    fn write_status(&mut self, status: u16);

    fn write_body(&mut self, body: &[u8]);
}

/// In-memory [`ResponseWriter`] that keeps whatever was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RecordedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Written status, if any.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

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

    /// Written body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Whether nothing at all has been written.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_empty()
    }
}

impl ResponseWriter for RecordedResponse {
    fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn write_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    fn write_body(&mut self, body: &[u8]) {
        self.body.extend_from_slice(body);
    }
}
