//! Mock Handler Builder
//!
//! Declaratively assemble a mock request handler for tests: register an
//! ordered list of rules, each a set of conditions plus a canned response,
//! and build a handler that answers every request with the first rule whose
//! conditions all hold. The handler records how often each rule fired and
//! whether any request went unmatched, so tests can assert on it afterwards.
//!
//! # Features
//!
//! - **Request Matching**: Match by method, path, headers, query params, body
//! - **Custom Predicates**: Any `Fn(&MockRequest) -> bool` is a condition
//! - **Response Bodies**: Fixed text or bytes, generated from the request, or Handlebars templates
//! - **Bookkeeping**: Per-rule call counts and an unmatched flag, safe across threads
//! - **YAML Rules**: Load rule sets from configuration files
//! - **HTTP Host**: Serve a handler over HTTP/1.1 with hyper
//!
//! # Example
//!
//! ```
//! use mock_handler_builder::{condition, HandlerBuilder, MockRequest, Rule};
//!
//! let builder = HandlerBuilder::new()
//!     .with_rule(
//!         Rule::new("echo")
//!             .when(condition::method("GET"))
//!             .body_fn(|req| req.path().to_string()),
//!     );
//! let handler = builder.build();
//!
//! let response = handler.handle(&MockRequest::get("/foo")).unwrap();
//! assert_eq!(response.status(), Some(200));
//! assert_eq!(response.body_str(), Some("/foo"));
//! assert_eq!(builder.call_count("echo"), 1);
//!
//! assert!(handler.handle(&MockRequest::post("/foo")).is_none());
//! assert!(builder.failed());
//! ```
//!
//! # Example Configuration
//!
//! ```yaml
//! rules:
//!   - name: hello-world
//!     when:
//!       method: GET
//!       path:
//!         type: exact
//!         value: /hello
//!     response:
//!       status: 200
//!       body:
//!         type: json
//!         content:
//!           message: "Hello, World!"
//! ```

pub mod builder;
pub mod condition;
pub mod config;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod request;
pub mod response;
pub mod rule;
pub mod server;
pub mod template;

pub use builder::HandlerBuilder;
pub use condition::Condition;
pub use config::MockConfig;
pub use error::Error;
pub use handler::{Handler, Outcome};
pub use ledger::Ledger;
pub use request::MockRequest;
pub use response::{RecordedResponse, ResponseWriter};
pub use rule::{Body, Rule};
pub use server::MockServer;
