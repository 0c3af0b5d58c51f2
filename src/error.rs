//! Error types.
//!
//! Request handling never fails; these cover rule construction from patterns
//! and configuration, and the after-the-fact verification of bookkeeping.

use thiserror::Error;

/// Errors raised while building rules or verifying a handler's bookkeeping.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid glob `{pattern}`: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid JSON path `{expression}`: {reason}")]
    InvalidJsonPath { expression: String, reason: String },

    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] Box<handlebars::TemplateError>),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid base64 body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("failed to read body file {path}: {source}")]
    BodyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rule {index} ({name}): {source}")]
    Rule {
        index: usize,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{count} request(s) matched no rule")]
    UnmatchedRequests { count: u64 },

    #[error("rules never called: {}", .0.join(", "))]
    RulesNotCalled(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;
