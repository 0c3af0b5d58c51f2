//! YAML rule configuration.
//!
//! Defines rules declaratively and compiles them into a [`HandlerBuilder`].

use crate::builder::HandlerBuilder;
use crate::condition;
use crate::error::Error;
use crate::rule::{Body, ResponseDescriptor, Rule};
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    /// Rules in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,

    /// Hosting settings
    #[serde(default)]
    pub settings: ServerSettings,
}

impl MockConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration by compiling every rule.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.compile_rules()?;
        Ok(())
    }

    /// Compile the rules into a builder, preserving their order.
    pub fn into_builder(&self) -> Result<HandlerBuilder, Error> {
        Ok(self
            .compile_rules()?
            .into_iter()
            .fold(HandlerBuilder::new(), HandlerBuilder::with_rule))
    }

    fn compile_rules(&self) -> Result<Vec<Rule>, Error> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, def)| {
                def.compile().map_err(|e| Error::Rule {
                    index,
                    name: def.name.clone(),
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

/// A single rule definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// Name used for call counting
    pub name: String,

    /// Conditions; all must hold
    #[serde(default)]
    pub when: RequestMatcher,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,
}

impl RuleDefinition {
    /// Compile into a [`Rule`].
    pub fn compile(&self) -> Result<Rule, Error> {
        let mut rule = Rule::new(&self.name);
        let when = &self.when;

        if let Some(method) = &when.method {
            rule = rule.when(condition::method(method));
        }

        if let Some(path) = &when.path {
            rule = match path {
                PathMatcher::Exact { value } => rule.when(condition::path(value)),
                PathMatcher::Prefix { value } => rule.when(condition::path_prefix(value)),
                PathMatcher::Regex { pattern } => rule.when(condition::path_regex(pattern)?),
                PathMatcher::Glob { pattern } => rule.when(condition::path_glob(pattern)?),
            };
        }

        for (name, qm) in sorted(&when.query) {
            rule = match qm {
                QueryMatcher::Exact { value } => rule.when(condition::query(name, value)),
                QueryMatcher::Present => rule.when(condition::query_present(name)),
                QueryMatcher::Absent => rule.when(condition::query_absent(name)),
            };
        }

        for (name, hm) in sorted(&when.headers) {
            rule = match hm {
                HeaderMatcher::Exact { value } => rule.when(condition::header(name, value)),
                HeaderMatcher::Regex { pattern } => {
                    rule.when(condition::header_regex(name, pattern)?)
                }
                HeaderMatcher::Present => rule.when(condition::header_present(name)),
                HeaderMatcher::Absent => rule.when(condition::header_absent(name)),
                HeaderMatcher::Contains { value } => {
                    rule.when(condition::header_contains(name, value))
                }
            };
        }

        if let Some(body) = &when.body {
            rule = match body {
                BodyMatcher::Exact { value } => rule.when(condition::body(value.as_str())),
                BodyMatcher::Regex { pattern } => rule.when(condition::body_regex(pattern)?),
                BodyMatcher::JsonPath { expressions } => {
                    rule.when(condition::body_json_path(expressions.clone())?)
                }
                BodyMatcher::Contains { value } => rule.when(condition::body_contains(value)),
                BodyMatcher::Json => rule.when(condition::body_json()),
                BodyMatcher::Empty => rule.when(condition::body_empty()),
            };
        }

        Ok(rule.with_response(self.response.compile()?))
    }
}

// Map iteration order is unstable; sort so rules compile deterministically.
fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// The `when` block of a rule. Every field left out is unconstrained.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub path: Option<PathMatcher>,

    /// Keyed by parameter name
    #[serde(default)]
    pub query: HashMap<String, QueryMatcher>,

    /// Keyed by header name, compared case-insensitively
    #[serde(default)]
    pub headers: HashMap<String, HeaderMatcher>,

    #[serde(default)]
    pub body: Option<BodyMatcher>,
}

/// How `when.path` is compared, selected by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    Exact { value: String },
    /// Plain string prefix, no segment boundary implied
    Prefix { value: String },
    Regex { pattern: String },
    /// Shell-style; `*` also matches across `/`
    Glob { pattern: String },
}

/// Constraint on one query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryMatcher {
    /// Compared after percent-decoding
    Exact { value: String },
    Present,
    Absent,
}

/// Constraint on one request header; any of its values may satisfy it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderMatcher {
    Exact { value: String },
    Regex { pattern: String },
    Present,
    Absent,
    Contains { value: String },
}

/// Constraint on the buffered request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    /// Byte-for-byte equality with `value`
    Exact { value: String },
    /// Applied to the body as UTF-8; non-UTF-8 bodies never match
    Regex { pattern: String },
    /// Each expression must select something. A non-null expected value must
    /// also equal what was selected.
    JsonPath {
        expressions: HashMap<String, serde_json::Value>,
    },
    Contains { value: String },
    /// Parses as JSON
    Json,
    Empty,
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether text/json bodies are Handlebars templates
    #[serde(default)]
    pub template: bool,
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: HashMap::new(),
            body: None,
            template: false,
        }
    }
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    /// Compile into a [`ResponseDescriptor`]. Static bodies are loaded now.
    pub fn compile(&self) -> Result<ResponseDescriptor, Error> {
        if !(100..=599).contains(&self.status) {
            return Err(Error::InvalidStatus(self.status));
        }

        let mut headers = self.headers.clone();
        if let Some(body) = &self.body {
            let has_content_type = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                headers.insert("Content-Type".to_string(), body.content_type().to_string());
            }
        }

        let body = match &self.body {
            None => Body::default(),
            Some(ResponseBody::Text { content }) if self.template => {
                TemplateEngine::check(content)?;
                Body::Template(content.clone())
            }
            Some(ResponseBody::Json { content }) if self.template => {
                TemplateEngine::check_json(content)?;
                Body::JsonTemplate(content.clone())
            }
            Some(ResponseBody::Text { content }) => Body::Fixed(content.clone()),
            Some(ResponseBody::Json { content }) => Body::Fixed(content.to_string()),
            Some(binary) => Body::Bytes(binary.to_bytes()?),
        };

        Ok(ResponseDescriptor {
            status: self.status,
            headers,
            body,
        })
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(content.to_string().into_bytes()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                Ok(base64::engine::general_purpose::STANDARD.decode(content)?)
            }
            ResponseBody::File { path } => std::fs::read(path).map_err(|source| Error::BodyFile {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } => "application/octet-stream",
            ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Settings for serving the rules over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Status sent when no rule matches (the handler itself writes nothing)
    #[serde(default = "default_unmatched_status")]
    pub unmatched_status: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            unmatched_status: default_unmatched_status(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_unmatched_status() -> u16 {
    404
}
