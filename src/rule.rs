//! Rules: named condition lists paired with a canned response.

use crate::condition::Condition;
use crate::request::MockRequest;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Function producing a response body from the request.
pub type BodyFn = Arc<dyn Fn(&MockRequest) -> String + Send + Sync>;

/// Where a rule's response body comes from.
#[derive(Clone)]
pub enum Body {
    /// Fixed text
    Fixed(String),
    /// Fixed raw bytes, sent as-is
    Bytes(Vec<u8>),
    /// Computed from the request on every match
    Generated(BodyFn),
    /// Handlebars template rendered against the request
    Template(String),
    /// JSON document whose string fields are Handlebars templates
    JsonTemplate(serde_json::Value),
}

impl Default for Body {
    fn default() -> Self {
        Body::Fixed(String::new())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Fixed(s) => f.debug_tuple("Fixed").field(s).finish(),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Generated(_) => f.write_str("Generated(..)"),
            Body::Template(s) => f.debug_tuple("Template").field(s).finish(),
            Body::JsonTemplate(v) => f.debug_tuple("JsonTemplate").field(v).finish(),
        }
    }
}

/// Response returned when a rule matches.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

impl Default for ResponseDescriptor {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Body::default(),
        }
    }
}

/// A named conjunction of conditions and the response to send when all hold.
///
/// Names need not be unique; rules sharing a name share a call count.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    conditions: Vec<Arc<dyn Condition>>,
    response: ResponseDescriptor,
}

impl Rule {
    /// New rule answering `200` with an empty body and no conditions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            response: ResponseDescriptor::default(),
        }
    }

    /// Add a condition. All conditions must match for the rule to fire.
    pub fn when(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.response.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.insert(name.into(), value.into());
        self
    }

    /// Fixed body. Replaces any previous body source.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.response.body = Body::Fixed(body.into());
        self
    }

    /// Raw byte body, for payloads that are not text. Replaces any previous
    /// body source.
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.response.body = Body::Bytes(body.into());
        self
    }

    /// Body computed from the request. Replaces any previous body source.
    pub fn body_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&MockRequest) -> String + Send + Sync + 'static,
    {
        self.response.body = Body::Generated(Arc::new(f));
        self
    }

    /// Handlebars body. Replaces any previous body source.
    pub fn body_template(mut self, template: impl Into<String>) -> Self {
        self.response.body = Body::Template(template.into());
        self
    }

    pub(crate) fn with_response(mut self, response: ResponseDescriptor) -> Self {
        self.response = response;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }

    pub fn response(&self) -> &ResponseDescriptor {
        &self.response
    }

    /// Whether every condition holds for `request`. An empty rule matches all.
    pub fn matches(&self, request: &MockRequest) -> bool {
        self.conditions.iter().all(|c| {
            let hit = c.matches(request);
            debug!(rule = %self.name, condition = ?c, hit, "Checked condition");
            hit
        })
    }
}
