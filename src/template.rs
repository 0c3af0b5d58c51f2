//! Template engine for dynamic response bodies.
//!
//! Uses Handlebars with the incoming request in scope.

use crate::error::{Error, Result};
use crate::request::MockRequest;
use handlebars::{handlebars_helper, Handlebars, JsonValue as Json};
use serde::Serialize;
use std::collections::HashMap;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers, first value per lowercased name
    pub headers: HashMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
    /// How many times the rendering rule has fired, this request included
    pub call: u64,
}

impl TemplateContext {
    pub fn from_request(request: &MockRequest) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in request.headers() {
            headers
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| value.clone());
        }

        let body = request.body_str().map(String::from);
        let json = body.as_deref().and_then(|s| serde_json::from_str(s).ok());

        Self {
            method: request.method().to_string(),
            path: request.path().to_string(),
            query: request.query_params(),
            headers,
            body,
            json,
            call: 0,
        }
    }

    pub fn with_call(mut self, call: u64) -> Self {
        self.call = call;
        self
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("now", Box::new(now));
        handlebars.register_helper("default", Box::new(or_default));
        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("lower", Box::new(lower));

        // Bodies are not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Check that `template` parses.
    pub fn check(template: &str) -> Result<()> {
        handlebars::Template::compile(template)
            .map(|_| ())
            .map_err(|e| Error::InvalidTemplate(Box::new(e)))
    }

    /// Check every templated string inside a JSON value.
    pub fn check_json(json: &serde_json::Value) -> Result<()> {
        match json {
            serde_json::Value::String(s) if s.contains("{{") => Self::check(s),
            serde_json::Value::Array(arr) => arr.iter().try_for_each(Self::check_json),
            serde_json::Value::Object(obj) => obj.values().try_for_each(Self::check_json),
            _ => Ok(()),
        }
    }

    pub fn render(
        &self,
        template: &str,
        ctx: &TemplateContext,
    ) -> std::result::Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, ctx)
    }

    /// Render every string inside a JSON value that contains template syntax.
    pub fn render_json(
        &self,
        json: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> std::result::Result<serde_json::Value, handlebars::RenderError> {
        self.render_json_value(json, ctx)
    }

    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> std::result::Result<serde_json::Value, handlebars::RenderError> {
        match value {
            serde_json::Value::String(s) if s.contains("{{") => {
                let rendered = self.handlebars.render_template(s, ctx)?;
                Ok(serde_json::Value::String(rendered))
            }
            serde_json::Value::Array(arr) => {
                let rendered: std::result::Result<Vec<_>, _> = arr
                    .iter()
                    .map(|v| self.render_json_value(v, ctx))
                    .collect();
                Ok(serde_json::Value::Array(rendered?))
            }
            serde_json::Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json_value(v, ctx)?);
                }
                Ok(serde_json::Value::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// `{{now}}` or `{{now format="%H:%M"}}`. A bad format renders what it
// managed before the bad specifier.
handlebars_helper!(now: |{format: str = "%Y-%m-%dT%H:%M:%S%.3fZ"}| {
    use std::fmt::Write as _;
    let mut out = String::new();
    let _ = write!(out, "{}", chrono::Utc::now().format(format));
    out
});

// Missing, null and empty-string values fall back.
handlebars_helper!(or_default: |value: Json, fallback: str| match value {
    Json::Null => fallback.to_string(),
    Json::String(s) if s.is_empty() => fallback.to_string(),
    Json::String(s) => s.clone(),
    other => other.to_string(),
});

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
