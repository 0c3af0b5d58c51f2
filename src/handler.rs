//! The built request handler: ordered, first-match-wins rule dispatch.

use crate::ledger::Ledger;
use crate::request::MockRequest;
use crate::response::{RecordedResponse, ResponseWriter};
use crate::rule::{Body, Rule};
use crate::template::{TemplateContext, TemplateEngine};
use std::sync::Arc;
use tracing::{debug, error};

/// How a single request was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `rule` fired and its response was written.
    Matched { rule: String },
    /// No rule matched; nothing was written.
    Unmatched,
}

impl Outcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, Outcome::Matched { .. })
    }
}

/// Request handler produced by [`HandlerBuilder::build`](crate::HandlerBuilder::build).
///
/// Cheap to clone; clones share rules and bookkeeping.
#[derive(Clone)]
pub struct Handler {
    rules: Arc<Vec<Rule>>,
    ledger: Arc<Ledger>,
    templates: Arc<TemplateEngine>,
}

impl Handler {
    pub(crate) fn new(
        rules: Arc<Vec<Rule>>,
        ledger: Arc<Ledger>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        Self {
            rules,
            ledger,
            templates,
        }
    }

    /// Evaluate `request` and write the first matching rule's response.
    ///
    /// Rules are tried in registration order. When none matches the ledger is
    /// marked failed and `writer` is left untouched.
    pub fn serve(&self, request: &MockRequest, writer: &mut dyn ResponseWriter) -> Outcome {
        debug!(method = %request.method(), path = %request.path(), "Checking rules for request");

        let Some(rule) = self.rules.iter().find(|rule| {
            debug!(rule = %rule.name(), "Checking rule");
            rule.matches(request)
        }) else {
            error!(
                method = %request.method(),
                path = %request.path(),
                body_len = request.body().len(),
                "No rule matched request"
            );
            self.ledger.record_unmatched();
            return Outcome::Unmatched;
        };

        let count = self.ledger.record_match(rule.name());
        debug!(rule = %rule.name(), count, "Carrying out matching rule");

        let response = rule.response();
        for (name, value) in &response.headers {
            writer.add_header(name, value);
        }
        writer.write_status(response.status);
        writer.write_body(&self.render_body(rule, request, count));

        Outcome::Matched {
            rule: rule.name().to_string(),
        }
    }

    /// Evaluate `request` into a fresh [`RecordedResponse`]; `None` if no rule
    /// matched.
    pub fn handle(&self, request: &MockRequest) -> Option<RecordedResponse> {
        let mut response = RecordedResponse::new();
        self.serve(request, &mut response)
            .is_matched()
            .then_some(response)
    }

    fn render_body(&self, rule: &Rule, request: &MockRequest, call: u64) -> Vec<u8> {
        let rendered = match &rule.response().body {
            Body::Fixed(body) => return body.clone().into_bytes(),
            Body::Bytes(bytes) => return bytes.clone(),
            Body::Generated(f) => return f(request).into_bytes(),
            Body::Template(template) => {
                let ctx = TemplateContext::from_request(request).with_call(call);
                self.templates.render(template, &ctx)
            }
            Body::JsonTemplate(json) => {
                let ctx = TemplateContext::from_request(request).with_call(call);
                self.templates
                    .render_json(json, &ctx)
                    .map(|value| value.to_string())
            }
        };

        rendered.map(String::into_bytes).unwrap_or_else(|e| {
            error!(rule = %rule.name(), error = %e, "Failed to render body template");
            Vec::new()
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Bookkeeping shared with the builder and sibling handlers.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition;
    use crate::HandlerBuilder;

    #[test]
    fn test_writes_headers_status_then_body() {
        #[derive(Default)]
        struct Trace(Vec<String>);
        impl ResponseWriter for Trace {
            fn add_header(&mut self, name: &str, value: &str) {
                self.0.push(format!("header {}={}", name, value));
            }
            fn write_status(&mut self, status: u16) {
                self.0.push(format!("status {}", status));
            }
            fn write_body(&mut self, body: &[u8]) {
                self.0.push(format!("body {}", String::from_utf8_lossy(body)));
            }
        }

        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("r").status(202).header("X-A", "1").body("ok"))
            .build();

        let mut trace = Trace::default();
        let outcome = handler.serve(&MockRequest::get("/"), &mut trace);

        assert_eq!(outcome, Outcome::Matched { rule: "r".into() });
        assert_eq!(trace.0, vec!["header X-A=1", "status 202", "body ok"]);
    }

    #[test]
    fn test_unmatched_writes_nothing() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("only-post").when(condition::method("POST")))
            .build();

        let mut response = RecordedResponse::new();
        let outcome = handler.serve(&MockRequest::get("/"), &mut response);

        assert_eq!(outcome, Outcome::Unmatched);
        assert!(response.is_empty());
        assert!(handler.ledger().failed());
    }

    #[test]
    fn test_first_registered_wins() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("first").when(condition::path_prefix("/api")).body("1"))
            .with_rule(Rule::new("second").when(condition::path("/api/x")).body("2"))
            .build();

        let response = handler.handle(&MockRequest::get("/api/x")).unwrap();
        assert_eq!(response.body_str(), Some("1"));
        assert_eq!(handler.ledger().call_count("first"), 1);
        assert_eq!(handler.ledger().call_count("second"), 0);
    }

    #[test]
    fn test_template_body() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("echo").body_template("{{method}} {{upper path}}"))
            .build();

        let response = handler.handle(&MockRequest::post("/abc")).unwrap();
        assert_eq!(response.body_str(), Some("POST /ABC"));
    }

    #[test]
    fn test_template_sees_call_number() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("seq").body_template("call {{call}}"))
            .build();

        handler.handle(&MockRequest::get("/"));
        let second = handler.handle(&MockRequest::get("/")).unwrap();
        assert_eq!(second.body_str(), Some("call 2"));
    }

    #[test]
    fn test_bytes_body_written_unchanged() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("blob").body_bytes(vec![0xff, 0x00, 0x80]))
            .build();

        let response = handler.handle(&MockRequest::get("/")).unwrap();
        assert_eq!(response.body(), &[0xff, 0x00, 0x80]);
    }

    #[test]
    fn test_broken_template_still_counts_as_match() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("broken").body_template("{{#if}}"))
            .build();

        let response = handler.handle(&MockRequest::get("/")).unwrap();
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body_str(), Some(""));
        assert_eq!(handler.ledger().call_count("broken"), 1);
    }

    #[test]
    fn test_body_readable_by_conditions_and_generator() {
        let handler = HandlerBuilder::new()
            .with_rule(
                Rule::new("json")
                    .when(condition::body_json())
                    .when(condition::body_contains("ping"))
                    .body_fn(|r| r.body_str().unwrap_or_default().replace("ping", "pong")),
            )
            .build();

        let response = handler
            .handle(&MockRequest::post("/").with_body(r#"{"msg":"ping"}"#))
            .unwrap();
        assert_eq!(response.body_str(), Some(r#"{"msg":"pong"}"#));
    }

    #[test]
    fn test_concurrent_requests_keep_exact_counts() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("hot").body("x"))
            .build();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        handler.handle(&MockRequest::get("/"));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(handler.ledger().call_count("hot"), 1000);
    }
}
