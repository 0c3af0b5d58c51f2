//! Fluent assembly of rules into a [`Handler`].

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::ledger::Ledger;
use crate::rule::Rule;
use crate::template::TemplateEngine;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Accumulates rules and builds handlers over them.
///
/// Every handler built from one builder shares its [`Ledger`], so counts
/// recorded while serving are visible here.
///
/// ```
/// use mock_handler_builder::{condition, HandlerBuilder, MockRequest, Rule};
///
/// let builder = HandlerBuilder::new()
///     .with_rule(Rule::new("auth").when(condition::header("X", "1")).status(204))
///     .with_rule(Rule::new("fallback").status(200).body("hi"));
/// let handler = builder.build();
///
/// let response = handler.handle(&MockRequest::get("/")).unwrap();
/// assert_eq!(response.body_str(), Some("hi"));
/// assert_eq!(builder.call_count("fallback"), 1);
/// assert!(!builder.failed());
/// ```
#[derive(Clone, Default)]
pub struct HandlerBuilder {
    rules: Arc<Vec<Rule>>,
    ledger: Arc<Ledger>,
    templates: Arc<TemplateEngine>,
}

impl HandlerBuilder {
    /// A builder with no rules and a fresh, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Accepted unconditionally.
    ///
    /// Handlers built earlier keep the rule list they were built with.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        Arc::make_mut(&mut self.rules).push(rule);
        self
    }

    /// Build a handler over the current rules and the shared ledger.
    pub fn build(&self) -> Handler {
        Handler::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.ledger),
            Arc::clone(&self.templates),
        )
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Snapshot of call counts per rule name.
    pub fn called(&self) -> HashMap<String, u64> {
        self.ledger.called()
    }

    pub fn call_count(&self, rule: &str) -> u64 {
        self.ledger.call_count(rule)
    }

    /// Whether any request matched no rule.
    pub fn failed(&self) -> bool {
        self.ledger.failed()
    }

    /// Names of registered rules that never fired, in registration order.
    pub fn uncalled(&self) -> Vec<&str> {
        let called = self.ledger.called();
        let mut seen = HashSet::new();
        self.rules
            .iter()
            .map(Rule::name)
            .filter(|name| !called.contains_key(*name) && seen.insert(*name))
            .collect()
    }

    /// Fail if any request went unmatched or any rule never fired.
    pub fn verify(&self) -> Result<()> {
        if self.ledger.failed() {
            return Err(Error::UnmatchedRequests {
                count: self.ledger.unmatched(),
            });
        }
        let uncalled = self.uncalled();
        if !uncalled.is_empty() {
            return Err(Error::RulesNotCalled(
                uncalled.into_iter().map(String::from).collect(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition;
    use crate::request::MockRequest;

    #[test]
    fn test_new_builder_is_empty() {
        let builder = HandlerBuilder::new();
        assert!(builder.rules().is_empty());
        assert!(builder.called().is_empty());
        assert!(!builder.failed());
    }

    #[test]
    fn test_with_rule_keeps_order_and_duplicates() {
        let builder = HandlerBuilder::new()
            .with_rule(Rule::new("a"))
            .with_rule(Rule::new("b"))
            .with_rule(Rule::new("a"));
        let names: Vec<_> = builder.rules().iter().map(Rule::name).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    // One unconditioned rule answers everything.
    #[test]
    fn test_single_rule() {
        let builder = HandlerBuilder::new().with_rule(Rule::new("ok").status(200).body("hi"));
        let handler = builder.build();

        let response = handler.handle(&MockRequest::get("/anything")).unwrap();

        assert_eq!(response.status(), Some(200));
        assert_eq!(response.body_str(), Some("hi"));
        assert_eq!(builder.call_count("ok"), 1);
        assert!(!builder.failed());
    }

    #[test]
    fn test_no_rules_marks_failed() {
        let builder = HandlerBuilder::new();
        let handler = builder.build();

        assert!(handler.handle(&MockRequest::get("/")).is_none());
        assert!(builder.failed());
        assert!(builder.called().is_empty());
    }

    #[test]
    fn test_skips_rule_with_unmet_header() {
        let builder = HandlerBuilder::new()
            .with_rule(Rule::new("a").when(condition::header("X", "1")).body("a"))
            .with_rule(Rule::new("b").body("b"));
        let handler = builder.build();

        let response = handler.handle(&MockRequest::get("/")).unwrap();

        assert_eq!(response.body_str(), Some("b"));
        assert_eq!(builder.call_count("b"), 1);
        assert!(!builder.called().contains_key("a"));
    }

    #[test]
    fn test_generated_body_echoes_path() {
        let handler = HandlerBuilder::new()
            .with_rule(Rule::new("echo").body_fn(|r| r.path().to_string()))
            .build();

        let response = handler.handle(&MockRequest::get("/foo")).unwrap();
        assert_eq!(response.body_str(), Some("/foo"));
    }

    #[test]
    fn test_repeat_calls_accumulate() {
        let builder = HandlerBuilder::new().with_rule(Rule::new("again"));
        let handler = builder.build();

        handler.handle(&MockRequest::get("/"));
        handler.handle(&MockRequest::get("/"));

        assert_eq!(builder.call_count("again"), 2);
    }

    #[test]
    fn test_handlers_share_bookkeeping() {
        let builder = HandlerBuilder::new()
            .with_rule(Rule::new("get").when(condition::method("GET")));
        let first = builder.build();
        let second = builder.build();

        first.handle(&MockRequest::get("/"));
        second.handle(&MockRequest::get("/"));
        second.handle(&MockRequest::post("/"));

        assert_eq!(builder.call_count("get"), 2);
        assert_eq!(first.ledger().call_count("get"), 2);
        assert!(first.ledger().failed());
        assert!(builder.failed());
    }

    #[test]
    fn test_failed_never_resets() {
        let builder = HandlerBuilder::new().with_rule(Rule::new("get").when(condition::method("GET")));
        let handler = builder.build();

        handler.handle(&MockRequest::post("/"));
        handler.handle(&MockRequest::get("/"));
        handler.handle(&MockRequest::get("/"));

        assert!(builder.failed());
        assert_eq!(builder.ledger().unmatched(), 1);
    }

    #[test]
    fn test_same_name_merges_counts() {
        let builder = HandlerBuilder::new()
            .with_rule(Rule::new("dup").when(condition::path("/a")))
            .with_rule(Rule::new("dup").when(condition::path("/b")));
        let handler = builder.build();

        handler.handle(&MockRequest::get("/a"));
        handler.handle(&MockRequest::get("/b"));

        assert_eq!(builder.call_count("dup"), 2);
    }

    #[test]
    fn test_rules_added_after_build_stay_out_of_earlier_handlers() {
        let builder = HandlerBuilder::new().with_rule(Rule::new("a").when(condition::path("/a")));
        let early = builder.build();
        let builder = builder.with_rule(Rule::new("b"));
        let late = builder.build();

        assert!(early.handle(&MockRequest::get("/b")).is_none());
        assert!(late.handle(&MockRequest::get("/b")).is_some());
        assert_eq!(early.rules().len(), 1);
        assert_eq!(late.rules().len(), 2);
        assert!(builder.failed());
    }

    #[test]
    fn test_verify() {
        let builder = HandlerBuilder::new()
            .with_rule(Rule::new("a").when(condition::path("/a")))
            .with_rule(Rule::new("b").when(condition::path("/b")));
        let handler = builder.build();

        handler.handle(&MockRequest::get("/a"));
        match builder.verify() {
            Err(Error::RulesNotCalled(names)) => assert_eq!(names, vec!["b".to_string()]),
            other => panic!("Expected RulesNotCalled, got {:?}", other),
        }

        handler.handle(&MockRequest::get("/b"));
        assert!(builder.verify().is_ok());

        handler.handle(&MockRequest::get("/c"));
        assert!(matches!(
            builder.verify(),
            Err(Error::UnmatchedRequests { count: 1 })
        ));
    }
}
