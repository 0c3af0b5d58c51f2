//! Request conditions.
//!
//! A [`Condition`] is a single predicate over a [`MockRequest`]. Rules hold an
//! ordered list of them and match only when all of them do. Anything a
//! condition cannot evaluate (missing header, non-UTF-8 body, invalid JSON)
//! counts as a non-match.

use crate::error::{Error, Result};
use crate::request::MockRequest;
use globset::GlobMatcher;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A side-effect-free predicate over an incoming request.
pub trait Condition: fmt::Debug + Send + Sync {
    /// Whether `request` satisfies this condition.
    fn matches(&self, request: &MockRequest) -> bool;
}

impl<C: Condition + ?Sized> Condition for Arc<C> {
    fn matches(&self, request: &MockRequest) -> bool {
        (**self).matches(request)
    }
}

impl<C: Condition + ?Sized> Condition for Box<C> {
    fn matches(&self, request: &MockRequest) -> bool {
        (**self).matches(request)
    }
}

/// Header has exactly the given value. Names compare case-insensitively; any
/// one of several values may match.
#[derive(Debug, Clone)]
pub struct HeaderEquals {
    name: String,
    value: String,
}

impl Condition for HeaderEquals {
    fn matches(&self, request: &MockRequest) -> bool {
        request.header_values(&self.name).any(|v| v == self.value)
    }
}

/// Path equals the given string exactly.
#[derive(Debug, Clone)]
pub struct PathEquals(String);

impl Condition for PathEquals {
    fn matches(&self, request: &MockRequest) -> bool {
        request.path() == self.0
    }
}

/// Method equals the given one, ignoring ASCII case.
#[derive(Debug, Clone)]
pub struct MethodEquals(String);

impl Condition for MethodEquals {
    fn matches(&self, request: &MockRequest) -> bool {
        request.method().eq_ignore_ascii_case(&self.0)
    }
}

/// Body equals the given bytes exactly.
#[derive(Debug, Clone)]
pub struct BodyEquals(Vec<u8>);

impl Condition for BodyEquals {
    fn matches(&self, request: &MockRequest) -> bool {
        request.body() == self.0.as_slice()
    }
}

/// Caller-supplied predicate.
pub struct Predicate<F> {
    description: String,
    f: F,
}

impl<F> fmt::Debug for Predicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.description).finish()
    }
}

impl<F> Condition for Predicate<F>
where
    F: Fn(&MockRequest) -> bool + Send + Sync,
{
    fn matches(&self, request: &MockRequest) -> bool {
        (self.f)(request)
    }
}

/// Path pattern beyond exact equality.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Prefix(String),
    Regex(Regex),
    Glob(GlobMatcher),
}

impl Condition for PathPattern {
    fn matches(&self, request: &MockRequest) -> bool {
        let path = request.path();
        match self {
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathPattern::Regex(regex) => regex.is_match(path),
            PathPattern::Glob(glob) => glob.is_match(path),
        }
    }
}

/// Header pattern beyond exact equality.
#[derive(Debug, Clone)]
pub struct HeaderMatches {
    name: String,
    pattern: HeaderPattern,
}

#[derive(Debug, Clone)]
pub enum HeaderPattern {
    /// Header must be present (any value)
    Present,
    /// Header must be absent
    Absent,
    /// Some value must contain the substring
    Contains(String),
    /// Some value must match the regex
    Regex(Regex),
}

impl Condition for HeaderMatches {
    fn matches(&self, request: &MockRequest) -> bool {
        let mut values = request.header_values(&self.name);
        match &self.pattern {
            HeaderPattern::Present => values.next().is_some(),
            HeaderPattern::Absent => values.next().is_none(),
            HeaderPattern::Contains(needle) => values.any(|v| v.contains(needle.as_str())),
            HeaderPattern::Regex(regex) => values.any(|v| regex.is_match(v)),
        }
    }
}

/// Query parameter condition.
#[derive(Debug, Clone)]
pub struct QueryMatches {
    name: String,
    pattern: QueryPattern,
}

#[derive(Debug, Clone)]
pub enum QueryPattern {
    Equals(String),
    Present,
    Absent,
}

impl Condition for QueryMatches {
    fn matches(&self, request: &MockRequest) -> bool {
        let value = request.query_param(&self.name);
        match &self.pattern {
            QueryPattern::Equals(expected) => value.as_ref() == Some(expected),
            QueryPattern::Present => value.is_some(),
            QueryPattern::Absent => value.is_none(),
        }
    }
}

/// Body pattern beyond exact equality.
#[derive(Debug, Clone)]
pub enum BodyPattern {
    /// Body must contain substring
    Contains(String),
    /// Body must match the regex
    Regex(Regex),
    /// Body must be valid JSON (any structure)
    Json,
    /// Every JSON path must resolve; non-null expectations must equal the result
    JsonPath(HashMap<String, serde_json::Value>),
    /// Body must be empty
    Empty,
}

impl Condition for BodyPattern {
    fn matches(&self, request: &MockRequest) -> bool {
        let body = request.body_str();

        match self {
            BodyPattern::Contains(needle) => body.is_some_and(|b| b.contains(needle.as_str())),
            BodyPattern::Regex(regex) => body.is_some_and(|b| regex.is_match(b)),
            BodyPattern::Json => {
                body.is_some_and(|b| serde_json::from_str::<serde_json::Value>(b).is_ok())
            }
            BodyPattern::JsonPath(expressions) => body
                .and_then(|b| serde_json::from_str::<serde_json::Value>(b).ok())
                .is_some_and(|json| matches_json_paths(&json, expressions)),
            BodyPattern::Empty => request.body().is_empty(),
        }
    }
}

fn matches_json_paths(
    json: &serde_json::Value,
    expressions: &HashMap<String, serde_json::Value>,
) -> bool {
    use jsonpath_rust::JsonPath;

    for (path_expr, expected) in expressions {
        let path = match JsonPath::<serde_json::Value>::try_from(path_expr.as_str()) {
            Ok(p) => p,
            Err(_) => return false,
        };

        // Results come back as an array of every node the path selected.
        let found = match path.find(json) {
            serde_json::Value::Array(nodes) => nodes,
            serde_json::Value::Null => Vec::new(),
            single => vec![single],
        };

        let matches = if expected.is_null() {
            !found.is_empty()
        } else {
            found.iter().any(|node| node == expected)
        };
        if !matches {
            return false;
        }
    }
    true
}

/// Header `name` has value `value`.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> HeaderEquals {
    HeaderEquals {
        name: name.into(),
        value: value.into(),
    }
}

/// Path equals `path`.
pub fn path(path: impl Into<String>) -> PathEquals {
    PathEquals(path.into())
}

/// Method equals `method`.
pub fn method(method: impl Into<String>) -> MethodEquals {
    MethodEquals(method.into())
}

/// Body equals `body`.
pub fn body(body: impl Into<Vec<u8>>) -> BodyEquals {
    BodyEquals(body.into())
}

/// Custom predicate; `description` shows up in debug logs.
pub fn predicate<F>(description: impl Into<String>, f: F) -> Predicate<F>
where
    F: Fn(&MockRequest) -> bool + Send + Sync,
{
    Predicate {
        description: description.into(),
        f,
    }
}

pub fn path_prefix(prefix: impl Into<String>) -> PathPattern {
    PathPattern::Prefix(prefix.into())
}

pub fn path_regex(pattern: &str) -> Result<PathPattern> {
    compile_regex(pattern).map(PathPattern::Regex)
}

pub fn path_glob(pattern: &str) -> Result<PathPattern> {
    let glob = globset::Glob::new(pattern).map_err(|source| Error::InvalidGlob {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(PathPattern::Glob(glob.compile_matcher()))
}

pub fn header_present(name: impl Into<String>) -> HeaderMatches {
    header_matches(name, HeaderPattern::Present)
}

pub fn header_absent(name: impl Into<String>) -> HeaderMatches {
    header_matches(name, HeaderPattern::Absent)
}

pub fn header_contains(name: impl Into<String>, needle: impl Into<String>) -> HeaderMatches {
    header_matches(name, HeaderPattern::Contains(needle.into()))
}

pub fn header_regex(name: impl Into<String>, pattern: &str) -> Result<HeaderMatches> {
    Ok(header_matches(name, HeaderPattern::Regex(compile_regex(pattern)?)))
}

fn header_matches(name: impl Into<String>, pattern: HeaderPattern) -> HeaderMatches {
    HeaderMatches {
        name: name.into(),
        pattern,
    }
}

pub fn query(name: impl Into<String>, value: impl Into<String>) -> QueryMatches {
    QueryMatches {
        name: name.into(),
        pattern: QueryPattern::Equals(value.into()),
    }
}

pub fn query_present(name: impl Into<String>) -> QueryMatches {
    QueryMatches {
        name: name.into(),
        pattern: QueryPattern::Present,
    }
}

pub fn query_absent(name: impl Into<String>) -> QueryMatches {
    QueryMatches {
        name: name.into(),
        pattern: QueryPattern::Absent,
    }
}

pub fn body_contains(needle: impl Into<String>) -> BodyPattern {
    BodyPattern::Contains(needle.into())
}

pub fn body_regex(pattern: &str) -> Result<BodyPattern> {
    compile_regex(pattern).map(BodyPattern::Regex)
}

pub fn body_json() -> BodyPattern {
    BodyPattern::Json
}

/// Every expression must select something; non-null expectations must be
/// among the selected values.
pub fn body_json_path(expressions: HashMap<String, serde_json::Value>) -> Result<BodyPattern> {
    use jsonpath_rust::JsonPath;

    for expression in expressions.keys() {
        JsonPath::<serde_json::Value>::try_from(expression.as_str()).map_err(|e| {
            Error::InvalidJsonPath {
                expression: expression.clone(),
                reason: e.to_string(),
            }
        })?;
    }
    Ok(BodyPattern::JsonPath(expressions))
}

pub fn body_empty() -> BodyPattern {
    BodyPattern::Empty
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}
